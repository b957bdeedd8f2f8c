pub mod pose;
pub mod record;
pub mod stream;

pub use pose::{Chirality, FramePayload, HandPose, Quat, TransformSample, Vec3};
pub use record::{EntityKey, EntityRecord, Frame, RecordPart, StatusEvent, Tick};
pub use stream::RecordingStream;
