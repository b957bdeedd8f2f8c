use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::core::RecordingStream;
use crate::error::{ReplayError, Result};
use crate::input::codec::decode_stream;

/// Raw bytes of one recording file plus the name used in error reports
#[derive(Debug, Clone)]
pub struct NamedBuffer {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NamedBuffer {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A buffer that was dropped from its batch
#[derive(Debug)]
pub struct LoadFailure {
    pub name: String,
    pub error: ReplayError,
}

/// Outcome of one load batch
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Valid streams, in batch order
    pub streams: Vec<Arc<RecordingStream>>,
    pub failed: Vec<LoadFailure>,
}

impl LoadReport {
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Decode every buffer in order. A bad buffer is reported and skipped; it
/// never stops the rest of the batch.
pub fn decode_batch(buffers: Vec<NamedBuffer>) -> LoadReport {
    let mut report = LoadReport::default();

    for buffer in buffers {
        match decode_stream(&buffer.name, &buffer.bytes) {
            Ok(stream) => {
                debug!(
                    "Decoded {}: {} entities, {} ticks at {} fps",
                    buffer.name,
                    stream.entities.len(),
                    stream.frame_count,
                    stream.frame_rate
                );
                report.streams.push(Arc::new(stream));
            }
            Err(e) => {
                error!("{}; it has been ignored and removed", e);
                report.failed.push(LoadFailure {
                    name: buffer.name,
                    error: e,
                });
            }
        }
    }

    report
}

/// Clears the busy flag when the worker finishes or unwinds
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Decodes load batches on a background worker, one batch at a time
pub struct StreamLoader {
    busy: Arc<AtomicBool>,
}

impl Default for StreamLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamLoader {
    pub fn new() -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that is true while a batch is being decoded or applied
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Start decoding a batch off the calling thread.
    ///
    /// `on_loaded` runs on the worker exactly once, after every buffer has been
    /// decoded and while the busy flag is still set. The flag is cleared before
    /// the report is handed back. A second batch while one is running is refused.
    pub fn load_all<F>(&self, buffers: Vec<NamedBuffer>, on_loaded: F) -> Result<LoadTask>
    where
        F: FnOnce(&LoadReport) + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Unable to change files, a load is already running");
            return Err(ReplayError::LoadInProgress);
        }

        let (tx, rx) = oneshot::channel();
        let guard = BusyGuard(self.busy.clone());
        let count = buffers.len();

        std::thread::Builder::new()
            .name("stream-loader".to_string())
            .spawn(move || {
                let report = decode_batch(buffers);
                on_loaded(&report);
                drop(guard);
                let _ = tx.send(report);
            })?;

        debug!("Loading {} recording files", count);
        Ok(LoadTask { rx })
    }
}

/// Pending result of a load batch
pub struct LoadTask {
    rx: oneshot::Receiver<LoadReport>,
}

impl LoadTask {
    /// Non-blocking check, meant to be called once per control update
    pub fn try_finish(&mut self) -> Option<LoadReport> {
        match self.rx.try_recv() {
            Ok(report) => Some(report),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                error!("Stream loader exited without a report");
                Some(LoadReport::default())
            }
        }
    }

    /// Wait for the batch from async code
    pub async fn finish(self) -> LoadReport {
        self.rx.await.unwrap_or_else(|_| {
            error!("Stream loader exited without a report");
            LoadReport::default()
        })
    }

    /// Wait for the batch from a plain thread (not from inside a runtime)
    pub fn finish_blocking(self) -> LoadReport {
        self.rx.blocking_recv().unwrap_or_else(|_| {
            error!("Stream loader exited without a report");
            LoadReport::default()
        })
    }
}
