pub mod session;

pub use session::RecordingSession;
