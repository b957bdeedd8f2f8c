//! Helpers shared by every unit type: the playback cursor that implements the
//! hold-last-frame rule, and the buffer that accumulates a record while capturing.

use std::sync::Arc;

use crate::core::{EntityRecord, Frame, FramePayload, RecordPart, Tick};

/// Tracks which frame of each part is currently applied
#[derive(Debug, Default)]
pub struct PlaybackCursor {
    record: Option<Arc<EntityRecord>>,
    applied: Vec<Option<usize>>,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> Option<&Arc<EntityRecord>> {
        self.record.as_ref()
    }

    /// Replace the record; nothing counts as applied afterwards
    pub fn set_record(&mut self, record: Option<Arc<EntityRecord>>) {
        self.applied = vec![None; record.as_ref().map_or(0, |r| r.parts.len())];
        self.record = record;
    }

    /// Forget applied frames so the next seek reports every part again
    pub fn reset(&mut self) {
        self.applied.iter_mut().for_each(|a| *a = None);
    }

    /// Move to `tick` and return the parts whose held frame changed
    pub fn seek(&mut self, tick: Tick) -> Vec<usize> {
        let Some(record) = &self.record else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for (i, part) in record.parts.iter().enumerate() {
            let held = locate(part, self.applied[i], tick);
            if held != self.applied[i] {
                self.applied[i] = held;
                if held.is_some() {
                    changed.push(i);
                }
            }
        }
        changed
    }

    /// Frame currently held for a part
    pub fn held_frame(&self, part: usize) -> Option<&Frame> {
        let record = self.record.as_ref()?;
        let index = (*self.applied.get(part)?)?;
        record.parts.get(part)?.frames.get(index)
    }
}

/// Find the frame held at `tick`, scanning forward from the last applied one
/// and falling back to a binary search when moving backwards.
fn locate(part: &RecordPart, from: Option<usize>, tick: Tick) -> Option<usize> {
    match from {
        Some(mut i) if i < part.frames.len() && part.frames[i].tick <= tick => {
            while i + 1 < part.frames.len() && part.frames[i + 1].tick <= tick {
                i += 1;
            }
            Some(i)
        }
        _ => part.index_at(tick),
    }
}

/// In-progress record owned by a unit while capturing
#[derive(Debug)]
pub struct RecordBuffer {
    descriptor: String,
    kind: String,
    record: Option<EntityRecord>,
    tick: Tick,
}

impl RecordBuffer {
    pub fn new(descriptor: &str, kind: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            kind: kind.to_string(),
            record: None,
            tick: 0,
        }
    }

    /// Start a fresh record with `parts` empty timelines
    pub fn start(&mut self, tick: Tick, parts: usize) {
        let mut record = EntityRecord::new(self.descriptor.clone(), self.kind.clone());
        record.parts = vec![RecordPart::new(); parts];
        self.record = Some(record);
        self.tick = tick;
    }

    pub fn is_recording(&self) -> bool {
        self.record.is_some()
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Add a frame at the current tick to a part
    pub fn push_frame(&mut self, part: usize, payload: FramePayload) -> bool {
        let tick = self.tick;
        match self.record.as_mut().and_then(|r| r.parts.get_mut(part)) {
            Some(p) => p.add_frame(Frame::new(tick, payload)),
            None => false,
        }
    }

    /// Add an activation change at the current tick
    pub fn push_status(&mut self, active: bool) {
        let tick = self.tick;
        if let Some(record) = self.record.as_mut() {
            record.add_status(active, tick);
        }
    }

    /// Take the finished record. Without a prior `start` this is an empty record.
    pub fn finish(&mut self) -> EntityRecord {
        self.record
            .take()
            .unwrap_or_else(|| EntityRecord::new(self.descriptor.clone(), self.kind.clone()))
    }
}
