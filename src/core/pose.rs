use serde::{Deserialize, Serialize};

/// A 3-component vector (position, scale, joint location)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3(pub [f32; 3]);

impl Vec3 {
    pub const ZERO: Vec3 = Vec3([0.0, 0.0, 0.0]);
    pub const ONE: Vec3 = Vec3([1.0, 1.0, 1.0]);

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self([x, y, z])
    }

    pub fn x(&self) -> f32 {
        self.0[0]
    }

    pub fn y(&self) -> f32 {
        self.0[1]
    }

    pub fn z(&self) -> f32 {
        self.0[2]
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Rotation quaternion stored as (x, y, z, w)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat(pub [f32; 4]);

impl Quat {
    pub const IDENTITY: Quat = Quat([0.0, 0.0, 0.0, 1.0]);

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self([x, y, z, w])
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Local transform snapshot of one scene node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSample {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl TransformSample {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

impl Default for TransformSample {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Which hand a pose belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Chirality {
    Left,
    Right,
}

/// Articulated hand pose as reported by a hand tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandPose {
    pub chirality: Chirality,
    /// Palm transform
    pub palm: TransformSample,
    /// Joint positions, finger-major (thumb first)
    pub joints: Vec<Vec3>,
    pub pinch_strength: f32,
    pub grab_strength: f32,
}

impl HandPose {
    pub fn open(chirality: Chirality) -> Self {
        Self {
            chirality,
            palm: TransformSample::default(),
            joints: Vec::new(),
            pinch_strength: 0.0,
            grab_strength: 0.0,
        }
    }
}

/// Payload carried by a single recorded frame.
///
/// Each unit type owns one variant; playback code matches on it instead of
/// inspecting types at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FramePayload {
    Transform(TransformSample),
    Hand(HandPose),
}

impl FramePayload {
    /// Short tag used in advisory messages
    pub fn tag(&self) -> &'static str {
        match self {
            FramePayload::Transform(_) => "transform",
            FramePayload::Hand(_) => "hand",
        }
    }

    pub fn as_transform(&self) -> Option<&TransformSample> {
        match self {
            FramePayload::Transform(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_hand(&self) -> Option<&HandPose> {
        match self {
            FramePayload::Hand(h) => Some(h),
            _ => None,
        }
    }
}
