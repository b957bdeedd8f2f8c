use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::{RecordingStream, Tick};
use crate::units::UnitHandle;

/// Drives a set of units through a recording at a fixed tick rate.
///
/// Wall time is fed in through [`RecordingSession::advance`] and turned into
/// ticks with the same accumulator rule playback uses, so a recording made at
/// 60 fps plays back tick for tick.
pub struct RecordingSession {
    frame_rate: u32,
    tick_interval: f64,
    units: Vec<UnitHandle>,
    accumulator: f64,
    current_tick: Tick,
    started_at: Option<DateTime<Utc>>,
}

impl RecordingSession {
    pub fn new(frame_rate: u32, units: Vec<UnitHandle>) -> Self {
        let frame_rate = if frame_rate == 0 {
            warn!("Frame rate of 0 is not recordable, using 1");
            1
        } else {
            frame_rate
        };

        Self {
            frame_rate,
            tick_interval: 1.0 / frame_rate as f64,
            units,
            accumulator: 0.0,
            current_tick: 0,
            started_at: None,
        }
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn is_recording(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin recording every unit at tick 0
    pub fn start(&mut self) {
        if self.is_recording() {
            warn!("Recording already running, restarting");
        }
        self.accumulator = 0.0;
        self.current_tick = 0;
        self.started_at = Some(Utc::now());

        for unit in &self.units {
            unit.start_recording(0);
        }
        info!(
            "Recording {} units at {} fps",
            self.units.len(),
            self.frame_rate
        );
    }

    /// Feed `delta` seconds and record each tick that elapsed. Returns the
    /// number of ticks recorded.
    pub fn advance(&mut self, delta: f64) -> usize {
        if !self.is_recording() || !(delta >= 0.0) {
            return 0;
        }

        self.accumulator += delta;
        let mut recorded = 0;
        while self.accumulator >= self.tick_interval {
            self.accumulator -= self.tick_interval;
            self.current_tick += 1;
            for unit in &self.units {
                unit.record_tick(self.current_tick);
            }
            recorded += 1;
        }
        recorded
    }

    /// Finish recording and gather every unit's record into a stream
    pub fn stop(&mut self) -> RecordingStream {
        let Some(started_at) = self.started_at.take() else {
            warn!("Recording stopped without being started");
            return RecordingStream::new(self.frame_rate, 0, Vec::new());
        };

        let records = self.units.iter().map(|u| u.stop_recording()).collect();
        let stream = RecordingStream::new(self.frame_rate, self.current_tick, records);

        debug!(
            "Recorded {} ticks since {}, {} frames across {} entities",
            stream.frame_count,
            started_at.format("%H:%M:%S"),
            stream.total_frames(),
            stream.entities.len()
        );
        stream
    }
}
