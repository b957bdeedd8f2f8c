use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{EntityRecord, FramePayload, Tick};
use crate::units::cursor::PlaybackCursor;
use crate::units::recordable::Recordable;

/// Recordable unit that applies nothing and remembers every call.
///
/// Stands in for entity types this build has no adapter for, and for tests.
pub struct MockUnit {
    descriptor: String,
    kind: String,
    active: AtomicBool,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    cursor: PlaybackCursor,
    played: Vec<Tick>,
    applied: Vec<(Tick, FramePayload)>,
    activations: Vec<bool>,
    record_swaps: usize,
    starts: usize,
    scripted: HashMap<Tick, Vec<String>>,
}

impl MockUnit {
    pub fn new(descriptor: &str, kind: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            kind: kind.to_string(),
            active: AtomicBool::new(true),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Return `message` from `play_tick(tick)`
    pub fn script_message(&self, tick: Tick, message: &str) {
        self.state
            .lock()
            .scripted
            .entry(tick)
            .or_default()
            .push(message.to_string());
    }

    /// Ticks passed to `play_tick`, in call order
    pub fn played_ticks(&self) -> Vec<Tick> {
        self.state.lock().played.clone()
    }

    /// Frames applied to part 0, with the tick they were applied at
    pub fn applied_frames(&self) -> Vec<(Tick, FramePayload)> {
        self.state.lock().applied.clone()
    }

    /// Values passed to `set_active`, in call order
    pub fn activations(&self) -> Vec<bool> {
        self.state.lock().activations.clone()
    }

    pub fn record_swaps(&self) -> usize {
        self.state.lock().record_swaps
    }

    pub fn has_record(&self) -> bool {
        self.state.lock().cursor.record().is_some()
    }

    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }
}

impl Recordable for MockUnit {
    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn start_recording(&self, _tick: Tick) {}

    fn record_tick(&self, _tick: Tick) {}

    fn stop_recording(&self) -> EntityRecord {
        EntityRecord::new(self.descriptor.clone(), self.kind.clone())
    }

    fn start_playing(&self) {
        let mut state = self.state.lock();
        state.starts += 1;
        state.cursor.reset();
    }

    fn set_active_record(&self, record: Option<Arc<EntityRecord>>) {
        let mut state = self.state.lock();
        state.record_swaps += 1;
        state.cursor.set_record(record);
    }

    fn play_tick(&self, tick: Tick) -> Vec<String> {
        let mut state = self.state.lock();
        state.played.push(tick);

        let changed = state.cursor.seek(tick);
        if changed.contains(&0) {
            if let Some(frame) = state.cursor.held_frame(0).map(|f| f.payload.clone()) {
                state.applied.push((tick, frame));
            }
        }

        state.scripted.get(&tick).cloned().unwrap_or_default()
    }

    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.state.lock().activations.push(active);
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
