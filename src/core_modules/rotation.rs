// THEORY:
// Cameras deliver frames in sensor orientation and tag them with the rotation
// needed to display them upright. The detector measures luma in sensor space
// but reports rectangles in display space, so every cell rectangle goes
// through a fixed transform table once its geometry is known.
//
// Rectangles here are normalized: both axes run 0..1 over the frame.

use serde::Serialize;
use tracing::warn;

/// A rectangle in normalized (0..1) frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct NormalizedRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl NormalizedRect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }

    pub fn scale(self, sx: f32, sy: f32) -> Self {
        Self::new(self.left * sx, self.top * sy, self.right * sx, self.bottom * sy)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Maps the rectangle into the upright orientation for `rotation`.
    pub fn rotate(self, rotation: Rotation) -> Self {
        let Self { left, top, right, bottom } = self;
        match rotation {
            Rotation::Deg0 => self,
            Rotation::Deg90 => Self::new(1.0 - bottom, left, 1.0 - top, right),
            Rotation::Deg180 => Self::new(1.0 - right, 1.0 - bottom, 1.0 - left, 1.0 - top),
            Rotation::Deg270 => Self::new(top, 1.0 - right, bottom, 1.0 - left),
        }
    }
}

/// The four frame rotations a video source may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Deg0),
            90 => Some(Self::Deg90),
            180 => Some(Self::Deg180),
            270 => Some(Self::Deg270),
            _ => None,
        }
    }

    /// Like `from_degrees`, but an unsupported value falls back to `Deg0` and is logged.
    pub fn from_degrees_or_identity(degrees: i32) -> Self {
        Self::from_degrees(degrees).unwrap_or_else(|| {
            warn!(degrees, "unsupported frame rotation, treating as 0");
            Self::Deg0
        })
    }

    pub fn degrees(self) -> i32 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// True when the displayed frame has width and height swapped.
    pub fn is_transposed(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}
