// THEORY:
// The `LumaPlane` is the most fundamental unit of the detector. It is a "dumb"
// data container for the brightness channel of one video frame: a width, a
// height, a row stride and one byte per pixel. It knows how to check that its
// own geometry is sane, but it never compares itself against anything.
//
// The bytes live behind an `Arc<[u8]>` so handing a plane from the frame
// delivery path to the analysis worker is a reference-count bump, not a copy.
// Planar YUV frames already carry their Y plane in exactly this shape; other
// representations (interleaved RGBA, decoded images) are converted once, here,
// so the per-cell averaging loop only ever sees plain luma bytes.

use crate::error::PlaneError;
use crate::pipeline::{GRID_COLUMNS, GRID_ROWS};
use image::GrayImage;
use std::sync::Arc;

/// An immutable view of one frame's luma plane.
#[derive(Debug, Clone)]
pub struct LumaPlane {
    /// The visible width of the plane in pixels.
    pub width: u32,
    /// The visible height of the plane in pixels.
    pub height: u32,
    /// The distance in bytes between the start of two consecutive rows.
    pub stride: u32,
    data: Arc<[u8]>,
}

impl LumaPlane {
    pub fn new(width: u32, height: u32, stride: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            stride,
            data: data.into(),
        }
    }

    /// A tightly packed plane (`stride == width`).
    pub fn packed(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(width, height, width, data)
    }

    /// Converts interleaved RGBA bytes into a packed luma plane using the
    /// Rec. 601 weights. Returns `None` if the buffer is too short.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Option<Self> {
        let pixels = width as usize * height as usize;
        if rgba.len() < pixels * 4 {
            return None;
        }
        let luma: Vec<u8> = rgba
            .chunks_exact(4)
            .take(pixels)
            .map(|px| rec601_luma(px[0], px[1], px[2]))
            .collect();
        Some(Self::packed(width, height, luma))
    }

    pub fn from_luma_image(image: &GrayImage) -> Self {
        Self::packed(image.width(), image.height(), image.as_raw().as_slice())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Checks that every cell of the fixed grid can be read without leaving the buffer.
    pub fn validate(&self) -> Result<(), PlaneError> {
        if self.width == 0 || self.height == 0 {
            return Err(PlaneError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        if self.stride < self.width {
            return Err(PlaneError::StrideTooSmall {
                stride: self.stride,
                width: self.width,
            });
        }
        if self.width < GRID_COLUMNS || self.height < GRID_ROWS {
            return Err(PlaneError::GridTooCoarse {
                width: self.width,
                height: self.height,
                columns: GRID_COLUMNS,
                rows: GRID_ROWS,
            });
        }
        // The last row does not need to be padded out to the full stride.
        let expected = self.stride as usize * (self.height as usize - 1) + self.width as usize;
        if self.data.len() < expected {
            return Err(PlaneError::BufferTooShort {
                got: self.data.len(),
                expected,
            });
        }
        Ok(())
    }
}

/// Rec. 601 luma, integer fixed-point (weights scaled by 256).
#[inline]
fn rec601_luma(red: u8, green: u8, blue: u8) -> u8 {
    let weighted = 77 * red as u32 + 150 * green as u32 + 29 * blue as u32;
    (weighted >> 8) as u8
}
