// THEORY:
// `GridGeometry` is everything about the grid that depends only on the frame's
// shape: cell size, the corrected aspect ratio and the display-space rectangle
// of every cell. None of it depends on pixel content, so it is computed once
// per (width, height, rotation) and reused until one of those changes.
//
// `GridState` makes the "geometry changed => baseline reset" rule structural:
// a baseline can only exist next to the geometry it was measured with, and
// replacing the geometry replaces the baseline with it.

use crate::core_modules::cell::CellWindow;
use crate::core_modules::grid_engine::LumaMatrix;
use crate::core_modules::rotation::{NormalizedRect, Rotation};
use crate::pipeline::{GRID_CELLS, GRID_COLUMNS, GRID_ROWS};

#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    /// Width of a single cell in pixels.
    pub cell_width: u32,
    /// Height of a single cell in pixels.
    pub cell_height: u32,
    pub pixels_per_cell: u32,
    /// Display aspect ratio (width over height once the rotation is applied).
    pub aspect_ratio: f64,
    /// Upright rectangle of each cell, row-major.
    cell_rects: Vec<NormalizedRect>,
}

impl GridGeometry {
    pub fn new(width: u32, height: u32, rotation: Rotation) -> Self {
        let cell_width = width / GRID_COLUMNS;
        let cell_height = height / GRID_ROWS;
        let aspect_ratio = if rotation.is_transposed() {
            height as f64 / width as f64
        } else {
            width as f64 / height as f64
        };

        let unit = NormalizedRect::new(0.0, 0.0, cell_width as f32, cell_height as f32);
        let (sx, sy) = (1.0 / width as f32, 1.0 / height as f32);
        let mut cell_rects = Vec::with_capacity(GRID_CELLS);
        for row in 0..GRID_ROWS {
            for column in 0..GRID_COLUMNS {
                let rect = unit
                    .offset((column * cell_width) as f32, (row * cell_height) as f32)
                    .scale(sx, sy)
                    .rotate(rotation);
                cell_rects.push(rect);
            }
        }

        Self {
            width,
            height,
            rotation,
            cell_width,
            cell_height,
            pixels_per_cell: cell_width * cell_height,
            aspect_ratio,
            cell_rects,
        }
    }

    pub fn matches(&self, width: u32, height: u32, rotation: Rotation) -> bool {
        self.width == width && self.height == height && self.rotation == rotation
    }

    pub fn window(&self, column: u32, row: u32) -> CellWindow {
        CellWindow {
            column,
            row,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    pub fn cell_rect(&self, column: u32, row: u32) -> NormalizedRect {
        self.cell_rects[(row * GRID_COLUMNS + column) as usize]
    }
}

/// Cached geometry plus the baseline measured against it.
#[derive(Debug, Clone, Default)]
pub enum GridState {
    #[default]
    Uninitialized,
    Ready {
        geometry: GridGeometry,
        baseline: LumaMatrix,
    },
}

impl GridState {
    pub fn geometry(&self) -> Option<&GridGeometry> {
        match self {
            Self::Uninitialized => None,
            Self::Ready { geometry, .. } => Some(geometry),
        }
    }

    /// The baseline to compare against, only if it was taken with the same geometry.
    pub fn baseline_for(&self, width: u32, height: u32, rotation: Rotation) -> Option<&LumaMatrix> {
        match self {
            Self::Ready { geometry, baseline } if geometry.matches(width, height, rotation) => {
                Some(baseline)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_dimensions_truncate() {
        let geometry = GridGeometry::new(170, 125, Rotation::Deg0);
        assert_eq!(geometry.cell_width, 10);
        assert_eq!(geometry.cell_height, 10);
        assert_eq!(geometry.pixels_per_cell, 100);
    }

    #[test]
    fn aspect_ratio_follows_rotation() {
        let upright = GridGeometry::new(160, 120, Rotation::Deg0);
        let turned = GridGeometry::new(160, 120, Rotation::Deg90);
        assert!((upright.aspect_ratio - 160.0 / 120.0).abs() < 1e-9);
        assert!((turned.aspect_ratio - 120.0 / 160.0).abs() < 1e-9);
        assert!((GridGeometry::new(160, 120, Rotation::Deg270).aspect_ratio - 0.75).abs() < 1e-9);
        assert!((GridGeometry::new(160, 120, Rotation::Deg180).aspect_ratio - 160.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn unrotated_rects_tile_the_frame() {
        let geometry = GridGeometry::new(160, 120, Rotation::Deg0);
        let first = geometry.cell_rect(0, 0);
        assert_eq!((first.left, first.top), (0.0, 0.0));
        assert!((first.right - 0.0625).abs() < 1e-6);
        assert!((first.bottom - 10.0 / 120.0).abs() < 1e-6);
        let last = geometry.cell_rect(GRID_COLUMNS - 1, GRID_ROWS - 1);
        assert!((last.right - 1.0).abs() < 1e-6);
        assert!((last.bottom - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rotated_rects_use_the_transform_table() {
        let geometry = GridGeometry::new(160, 120, Rotation::Deg90);
        // Top-left sensor cell ends up in the top-right corner once upright.
        let rect = geometry.cell_rect(0, 0);
        assert!((rect.left - (1.0 - 10.0 / 120.0)).abs() < 1e-6);
        assert!(rect.top.abs() < 1e-6);
        assert!((rect.right - 1.0).abs() < 1e-6);
        assert!((rect.bottom - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn baseline_requires_matching_geometry() {
        let state = GridState::Ready {
            geometry: GridGeometry::new(160, 120, Rotation::Deg0),
            baseline: LumaMatrix::default(),
        };
        assert!(state.baseline_for(160, 120, Rotation::Deg0).is_some());
        assert!(state.baseline_for(160, 120, Rotation::Deg90).is_none());
        assert!(state.baseline_for(320, 240, Rotation::Deg0).is_none());
        assert!(GridState::Uninitialized.baseline_for(160, 120, Rotation::Deg0).is_none());
    }
}
