use thiserror::Error;

/// Errors surfaced by loading, playback control and settings
#[derive(Debug, Error)]
pub enum ReplayError {
    /// Playback was requested with nothing loaded
    #[error("no recording streams loaded")]
    NoStreamsLoaded,

    /// A reload or control change arrived while a load batch was still running
    #[error("a stream load is already in progress")]
    LoadInProgress,

    /// The buffer decoded but is not a usable recording
    #[error("{name} is an invalid recording file: {reason}")]
    InvalidStream { name: String, reason: String },

    /// The buffer could not be decoded at all
    #[error("{name} could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: bincode::error::DecodeError,
    },

    #[error("failed to encode recording: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid settings: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReplayError>;
