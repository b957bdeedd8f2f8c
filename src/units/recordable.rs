use std::sync::Arc;

use crate::core::{EntityKey, EntityRecord, Tick};

/// Shared handle to a live recordable unit
pub type UnitHandle = Arc<dyn Recordable>;

/// Capture/apply adapter for one entity in the scene.
///
/// The playback engine calls `play_tick` from its timing thread, so every
/// method takes `&self` and implementations keep their caches behind their own
/// locks. `set_active` is the exception: it toggles the live object and is only
/// ever called from the control thread during `PlaybackEngine::update`.
pub trait Recordable: Send + Sync {
    /// Stable name of the entity, shared between recording and playback
    fn descriptor(&self) -> &str;

    /// Type tag of this unit (e.g. "transform", "hand")
    fn kind(&self) -> &str;

    fn key(&self) -> EntityKey {
        EntityKey::new(self.descriptor(), self.kind())
    }

    /// Begin a fresh record at `tick`
    fn start_recording(&self, tick: Tick);

    /// Sample the live object for `tick`
    fn record_tick(&self, tick: Tick);

    /// Finish recording and hand over everything captured
    fn stop_recording(&self) -> EntityRecord;

    /// Prepare for playback, forgetting any previously applied frame
    fn start_playing(&self);

    /// Swap the record played back. `None` leaves the unit frozen.
    fn set_active_record(&self, record: Option<Arc<EntityRecord>>);

    /// Apply the frames held at `tick`, returning advisory messages.
    ///
    /// Must not block and must tolerate ticks with no frame of their own.
    fn play_tick(&self, tick: Tick) -> Vec<String>;

    /// Enable or disable the live object
    fn set_active(&self, active: bool);

    fn is_active(&self) -> bool;
}
