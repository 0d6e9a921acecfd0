// THEORY:
// The `pipeline` module holds the vocabulary shared by every layer: the fixed
// grid dimensions, the sensitivity threshold, and the two shapes a detection
// pass can take on its way out of the crate.
//
// - `DetectionResult` is what in-process listeners receive, by reference and
//   once per pass.
// - `MotionEvent` is the flattened, serializable payload for the cross-boundary
//   event stream. It adds the frame's sequence number and acceptance time so a
//   consumer on the far side can order and timestamp what it receives.

use crate::core_modules::rotation::NormalizedRect;
use serde::Serialize;
use tracing::warn;

/// Number of grid columns across the frame.
pub const GRID_COLUMNS: u32 = 16;
/// Number of grid rows down the frame.
pub const GRID_ROWS: u32 = 12;
pub const GRID_CELLS: usize = (GRID_COLUMNS * GRID_ROWS) as usize;

/// Threshold on the per-cell luma delta. A cell is changed when
/// `|current - previous| > threshold`, so lower values are more sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sensitivity(u8);

impl Sensitivity {
    pub const DEFAULT: Sensitivity = Sensitivity(8);

    /// Builds a sensitivity from a host-supplied level, clamping into `0..=255`.
    pub fn from_level(level: i32) -> Self {
        let clamped = level.clamp(0, u8::MAX as i32);
        if clamped != level {
            warn!(level, clamped, "detection level out of range, clamping");
        }
        Self(clamped as u8)
    }

    pub fn threshold(self) -> u8 {
        self.0
    }

    /// True when the luma delta between the two samples exceeds the threshold.
    #[inline]
    pub fn is_exceeded(self, current: u8, previous: u8) -> bool {
        current.abs_diff(previous) > self.0
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A grid cell whose luma changed beyond the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChangedCell {
    /// Upright, normalized rectangle of the cell.
    #[serde(flatten)]
    pub rect: NormalizedRect,
    /// Current average luma of the cell.
    pub luma: u8,
    #[serde(skip)]
    pub column: u32,
    #[serde(skip)]
    pub row: u32,
}

/// The outcome of one detection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Changed cells in row-major grid order.
    pub cells: Vec<ChangedCell>,
    /// Display aspect ratio of the analyzed frame.
    pub aspect_ratio: f64,
    pub x_count: u32,
    pub y_count: u32,
}

impl DetectionResult {
    /// A pass that reported nothing, used for refused frames.
    pub fn empty() -> Self {
        Self {
            cells: Vec::new(),
            aspect_ratio: 1.0,
            x_count: GRID_COLUMNS,
            y_count: GRID_ROWS,
        }
    }

    pub fn has_motion(&self) -> bool {
        !self.cells.is_empty()
    }
}

/// The payload published on the event stream for each processed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MotionEvent {
    /// Acceptance order of the frame within the session.
    pub sequence: u64,
    /// Milliseconds between session start and frame acceptance.
    pub timestamp_ms: u64,
    pub aspect_ratio: f64,
    pub x_count: u32,
    pub y_count: u32,
    pub cells: Vec<ChangedCell>,
}

impl MotionEvent {
    pub fn new(sequence: u64, timestamp_ms: u64, result: &DetectionResult) -> Self {
        Self {
            sequence,
            timestamp_ms,
            aspect_ratio: result.aspect_ratio,
            x_count: result.x_count,
            y_count: result.y_count,
            cells: result.cells.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
