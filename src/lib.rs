//! Deterministic record and playback of scene state.
//!
//! Units capture transforms, hand poses and activation changes tick by tick
//! into a [`core::RecordingStream`]. The [`playback::PlaybackEngine`] loads
//! streams on a background worker, binds their entities to live units and
//! replays them from its own timing thread with pause, scrub and rate control.

pub mod capture;
pub mod core;
pub mod error;
pub mod input;
pub mod playback;
pub mod settings;
pub mod units;

pub use error::{ReplayError, Result};
pub use playback::{PlaybackEngine, PlaybackEvent, PlaybackState};
pub use settings::PlaybackConfig;
