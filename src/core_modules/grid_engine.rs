// THEORY:
// The `GridDiffEngine` is the analysis layer of the detector. It owns the grid
// state and orchestrates the flow of data from a raw luma plane down to the
// individual cells, collecting their results into a single `DetectionResult`.
//
// Key architectural principles:
// 1.  **Data Transformation**: Each pass slices the plane into the fixed 16x12
//     grid and reduces every cell to one average luma value. The resulting
//     `LumaMatrix` is the only thing remembered between frames.
// 2.  **Baseline Discipline**: A comparison only happens against a baseline
//     taken with identical geometry. The first frame, and the first frame after
//     a resize, rotation change or reset, silently becomes the new baseline.
// 3.  **Refusal over Guessing**: A malformed plane never reaches the averaging
//     loop. The pass is refused and the baseline is left exactly as it was.
// 4.  **Purity**: The engine knows nothing about timing, threads or listeners.
//     The `FrameGate` decides when to call it; the engine only answers "what
//     changed".

use crate::core_modules::grid_geometry::{GridGeometry, GridState};
use crate::core_modules::luma_plane::LumaPlane;
use crate::core_modules::rotation::Rotation;
use crate::error::PlaneError;
use crate::pipeline::{ChangedCell, DetectionResult, Sensitivity, GRID_CELLS, GRID_COLUMNS, GRID_ROWS};
use tracing::{debug, warn};

/// Average luma of every grid cell, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaMatrix([u8; GRID_CELLS]);

impl Default for LumaMatrix {
    fn default() -> Self {
        Self([0; GRID_CELLS])
    }
}

impl LumaMatrix {
    pub fn get(&self, column: u32, row: u32) -> u8 {
        self.0[(row * GRID_COLUMNS + column) as usize]
    }

    fn set(&mut self, column: u32, row: u32, luma: u8) {
        self.0[(row * GRID_COLUMNS + column) as usize] = luma;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// Block-based luma-difference detector over a fixed 16x12 grid.
#[derive(Debug, Default)]
pub struct GridDiffEngine {
    state: GridState,
}

impl GridDiffEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one pass, degrading any refused plane to an empty result.
    pub fn detect(&mut self, plane: &LumaPlane, rotation: i32, sensitivity: Sensitivity) -> DetectionResult {
        match self.try_detect(plane, rotation, sensitivity) {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, "refusing malformed luma plane");
                DetectionResult::empty()
            }
        }
    }

    /// Runs one pass. On error the baseline is untouched.
    pub fn try_detect(
        &mut self,
        plane: &LumaPlane,
        rotation: i32,
        sensitivity: Sensitivity,
    ) -> Result<DetectionResult, PlaneError> {
        plane.validate()?;
        let rotation = Rotation::from_degrees_or_identity(rotation);
        let (width, height) = (plane.width, plane.height);

        match &mut self.state {
            GridState::Ready { geometry, baseline } if geometry.matches(width, height, rotation) => {
                let current = Self::measure(geometry, plane);
                let result = Self::compare(geometry, baseline, &current, sensitivity);
                *baseline = current;
                Ok(result)
            }
            _ => {
                debug!(width, height, rotation = rotation.degrees(), "grid geometry changed, resetting baseline");
                let geometry = GridGeometry::new(width, height, rotation);
                let baseline = Self::measure(&geometry, plane);
                // Establish the new baseline without comparing.
                let result = DetectionResult {
                    aspect_ratio: geometry.aspect_ratio,
                    ..DetectionResult::empty()
                };
                self.state = GridState::Ready { geometry, baseline };
                Ok(result)
            }
        }
    }

    /// Drops the baseline and cached geometry; the next frame starts fresh.
    pub fn reset(&mut self) {
        self.state = GridState::Uninitialized;
    }

    pub fn has_baseline(&self) -> bool {
        matches!(self.state, GridState::Ready { .. })
    }

    pub fn geometry(&self) -> Option<&GridGeometry> {
        self.state.geometry()
    }

    fn measure(geometry: &GridGeometry, plane: &LumaPlane) -> LumaMatrix {
        let mut matrix = LumaMatrix::default();
        for row in 0..GRID_ROWS {
            for column in 0..GRID_COLUMNS {
                matrix.set(column, row, geometry.window(column, row).average_luma(plane));
            }
        }
        matrix
    }

    fn compare(
        geometry: &GridGeometry,
        baseline: &LumaMatrix,
        current: &LumaMatrix,
        sensitivity: Sensitivity,
    ) -> DetectionResult {
        let mut cells = Vec::new();
        for row in 0..GRID_ROWS {
            for column in 0..GRID_COLUMNS {
                let luma = current.get(column, row);
                if sensitivity.is_exceeded(luma, baseline.get(column, row)) {
                    cells.push(ChangedCell {
                        rect: geometry.cell_rect(column, row),
                        luma,
                        column,
                        row,
                    });
                }
            }
        }
        debug!(changed = cells.len(), threshold = sensitivity.threshold(), "grid comparison");

        DetectionResult {
            cells,
            aspect_ratio: geometry.aspect_ratio,
            x_count: GRID_COLUMNS,
            y_count: GRID_ROWS,
        }
    }
}
