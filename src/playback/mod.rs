pub mod binding;
pub mod clock;
pub mod dispatch;
pub mod engine;

pub use binding::{Binder, BinderInfo, BindingTable, RebuildReport};
pub use clock::{PlaybackClock, TickStep, DEFAULT_SCRUB_WAIT};
pub use dispatch::{dispatch_tick, StatusChange, TickReport, UnitMessages};
pub use engine::PlaybackEngine;

use crate::core::{EntityKey, Tick};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Notifications handed to the control thread by [`PlaybackEngine::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A unit returned advisory messages while playing a tick
    PlayMessages { key: EntityKey, messages: Vec<String> },
    /// A different stream (or a freshly loaded one) is now played back
    ActiveStreamChanged {
        index: usize,
        frame_rate: u32,
        frame_count: Tick,
    },
    /// A load batch finished; `failed` names the dropped buffers
    LoadFinished { loaded: usize, failed: Vec<String> },
    /// Playback is holding on the last tick
    ReachedEnd { tick: Tick },
}
