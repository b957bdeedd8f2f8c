use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{EntityRecord, FramePayload, Tick, TransformSample};
use crate::units::cursor::{PlaybackCursor, RecordBuffer};
use crate::units::recordable::Recordable;

/// Type tag written into records produced by [`TransformUnit`]
pub const TRANSFORM_KIND: &str = "transform";

/// Live transform of a scene node, shared with whatever moves it
pub type TransformHandle = Arc<Mutex<TransformSample>>;

/// Records and replays the local transform of a node and any number of extra
/// transforms (child bones, attached props). Each transform is one part.
pub struct TransformUnit {
    descriptor: String,
    base: TransformHandle,
    extras: Vec<Option<TransformHandle>>,
    active: AtomicBool,
    state: Mutex<TransformState>,
}

struct TransformState {
    buffer: RecordBuffer,
    /// Transforms captured at `start_recording`, in part order. A missing
    /// transform keeps its slot and records an empty part.
    recording: Vec<Option<TransformHandle>>,
    /// Last sample written per part
    last_recorded: Vec<Option<TransformSample>>,
    cursor: PlaybackCursor,
}

impl TransformUnit {
    pub fn new(descriptor: &str, base: TransformHandle) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            base,
            extras: Vec::new(),
            active: AtomicBool::new(true),
            state: Mutex::new(TransformState {
                buffer: RecordBuffer::new(descriptor, TRANSFORM_KIND),
                recording: Vec::new(),
                last_recorded: Vec::new(),
                cursor: PlaybackCursor::new(),
            }),
        }
    }

    /// Track an extra transform. `None` keeps the slot (and its part index)
    /// for a transform that is missing from the scene.
    pub fn with_extra(mut self, extra: Option<TransformHandle>) -> Self {
        self.extras.push(extra);
        self
    }

    pub fn base(&self) -> &TransformHandle {
        &self.base
    }

    /// Live transform a part is applied to during playback
    fn target(&self, part: usize) -> Option<&TransformHandle> {
        match part {
            0 => Some(&self.base),
            n => self.extras.get(n - 1).and_then(|e| e.as_ref()),
        }
    }
}

fn sample_all(handles: &[Option<TransformHandle>]) -> Vec<Option<TransformSample>> {
    handles.iter().map(|h| h.as_ref().map(|t| *t.lock())).collect()
}

impl Recordable for TransformUnit {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> &str {
        TRANSFORM_KIND
    }

    fn start_recording(&self, tick: Tick) {
        let mut state = self.state.lock();

        state.recording = std::iter::once(Some(self.base.clone()))
            .chain(self.extras.iter().cloned())
            .collect();
        let parts = state.recording.len();
        state.buffer.start(tick, parts);

        // Every part starts with the pose it had when recording began
        let samples = sample_all(&state.recording);
        for (i, sample) in samples.iter().enumerate() {
            if let Some(sample) = sample {
                state.buffer.push_frame(i, FramePayload::Transform(*sample));
            }
        }
        state.last_recorded = samples;
    }

    fn record_tick(&self, tick: Tick) {
        let mut state = self.state.lock();
        if !state.buffer.is_recording() {
            return;
        }
        state.buffer.set_tick(tick);

        let samples = sample_all(&state.recording);
        for (i, sample) in samples.into_iter().enumerate() {
            let Some(sample) = sample else {
                continue;
            };
            if state.last_recorded[i] != Some(sample)
                && state.buffer.push_frame(i, FramePayload::Transform(sample))
            {
                state.last_recorded[i] = Some(sample);
            }
        }
    }

    fn stop_recording(&self) -> EntityRecord {
        let mut state = self.state.lock();
        state.recording.clear();
        state.last_recorded.clear();
        state.buffer.finish()
    }

    fn start_playing(&self) {
        self.state.lock().cursor.reset();
    }

    fn set_active_record(&self, record: Option<Arc<EntityRecord>>) {
        self.state.lock().cursor.set_record(record);
    }

    fn play_tick(&self, tick: Tick) -> Vec<String> {
        let mut state = self.state.lock();
        let mut messages = Vec::new();

        let changed = state.cursor.seek(tick);
        for part in changed {
            let Some(frame) = state.cursor.held_frame(part) else {
                continue;
            };
            match (self.target(part), frame.payload.as_transform()) {
                (Some(target), Some(sample)) => *target.lock() = *sample,
                (None, _) => messages.push(format!(
                    "{}: part {} has no live transform at tick {}",
                    self.descriptor, part, tick
                )),
                (Some(_), None) => messages.push(format!(
                    "{}: part {} holds a {} frame at tick {}",
                    self.descriptor,
                    part,
                    frame.payload.tag(),
                    tick
                )),
            }
        }
        messages
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
