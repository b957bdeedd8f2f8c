use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::pose::FramePayload;

/// Discrete unit of recorded time, one tick lasts `1 / frame_rate` seconds
pub type Tick = u32;

/// A single recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub tick: Tick,
    pub payload: FramePayload,
}

impl Frame {
    pub fn new(tick: Tick, payload: FramePayload) -> Self {
        Self { tick, payload }
    }
}

/// Sparse timeline of frames for one sub-element of an entity.
///
/// Frames are strictly increasing in tick. Only ticks where something changed
/// are stored, so a lookup returns the last frame at or before the tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPart {
    pub frames: Vec<Frame>,
}

impl RecordPart {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Append a frame. Returns false (and drops the frame) if its tick does not
    /// come after the last stored one.
    pub fn add_frame(&mut self, frame: Frame) -> bool {
        if let Some(last) = self.frames.last() {
            if frame.tick <= last.tick {
                return false;
            }
        }
        self.frames.push(frame);
        true
    }

    /// Index of the last frame with `frame.tick <= tick`
    pub fn index_at(&self, tick: Tick) -> Option<usize> {
        let upper = self.frames.partition_point(|f| f.tick <= tick);
        upper.checked_sub(1)
    }

    /// Last frame with `frame.tick <= tick`
    pub fn frame_at(&self, tick: Tick) -> Option<&Frame> {
        self.index_at(tick).map(|i| &self.frames[i])
    }

    pub fn last_tick(&self) -> Option<Tick> {
        self.frames.last().map(|f| f.tick)
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.frames.windows(2).all(|w| w[0].tick < w[1].tick)
    }
}

/// Activation change at a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub tick: Tick,
    pub active: bool,
}

/// Durable identity of a recorded entity: descriptor plus type tag.
///
/// This is what binds recorded data to live units across sessions; it never
/// refers to a live object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub descriptor: String,
    pub kind: String,
}

impl EntityKey {
    pub fn new(descriptor: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.descriptor, self.kind)
    }
}

/// Everything recorded for one entity during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub descriptor: String,
    /// Type tag of the unit that produced this record
    pub kind: String,
    pub parts: Vec<RecordPart>,
    pub status: Vec<StatusEvent>,
}

impl EntityRecord {
    pub fn new(descriptor: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            kind: kind.into(),
            parts: Vec::new(),
            status: Vec::new(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.descriptor.clone(), self.kind.clone())
    }

    pub fn matches(&self, key: &EntityKey) -> bool {
        self.descriptor == key.descriptor && self.kind == key.kind
    }

    /// Record an activation change. A second event on the same tick replaces
    /// the first; events before the last stored tick are ignored.
    pub fn add_status(&mut self, active: bool, tick: Tick) {
        match self.status.last_mut() {
            Some(last) if last.tick == tick => last.active = active,
            Some(last) if last.tick > tick => {}
            _ => self.status.push(StatusEvent { tick, active }),
        }
    }

    /// Status event recorded exactly at `tick`
    pub fn status_at(&self, tick: Tick) -> Option<StatusEvent> {
        self.status
            .binary_search_by(|s| s.tick.cmp(&tick))
            .ok()
            .map(|i| self.status[i])
    }

    /// Latest status event at or before `tick`
    pub fn latest_status(&self, tick: Tick) -> Option<StatusEvent> {
        let upper = self.status.partition_point(|s| s.tick <= tick);
        upper.checked_sub(1).map(|i| self.status[i])
    }

    /// Highest tick referenced by any frame or status event
    pub fn max_tick(&self) -> Tick {
        let frames = self.parts.iter().filter_map(|p| p.last_tick()).max();
        let status = self.status.last().map(|s| s.tick);
        frames.max(status).unwrap_or(0)
    }
}
