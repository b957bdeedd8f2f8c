pub mod cursor;
pub mod hand;
pub mod mock;
pub mod recordable;
pub mod registry;
pub mod transform;

pub use cursor::{PlaybackCursor, RecordBuffer};
pub use hand::{HandUnit, HAND_KIND};
pub use mock::MockUnit;
pub use recordable::{Recordable, UnitHandle};
pub use registry::{unit_for, UnitRegistry};
pub use transform::{TransformHandle, TransformUnit, TRANSFORM_KIND};
