// THEORY:
// A cell is a rectangular window of the luma plane, one entry of the fixed
// grid. The core operation of a cell is `average_luma`: a single mean over the
// window cancels out single-pixel sensor noise, so only spatially coherent
// brightness changes survive into the comparison step.
//
// The window is read row by row, honoring the plane's stride, with integer
// (truncating) division at the end.

use crate::core_modules::luma_plane::LumaPlane;

/// The pixel window covered by one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWindow {
    /// Column index of the cell in the grid.
    pub column: u32,
    /// Row index of the cell in the grid.
    pub row: u32,
    /// Width of the window in pixels.
    pub width: u32,
    /// Height of the window in pixels.
    pub height: u32,
}

impl CellWindow {
    /// Mean luma of the window. The caller guarantees the plane has been validated.
    pub fn average_luma(&self, plane: &LumaPlane) -> u8 {
        let pixels = self.width as u64 * self.height as u64;
        if pixels == 0 {
            return 0;
        }

        let stride = plane.stride as usize;
        let x_offset = (self.column * self.width) as usize;
        let y_offset = (self.row * self.height) as usize;
        let data = plane.data();

        let mut sum = 0u64;
        for y in 0..self.height as usize {
            let start = (y_offset + y) * stride + x_offset;
            let row = &data[start..start + self.width as usize];
            sum += row.iter().map(|&luma| luma as u64).sum::<u64>();
        }

        (sum / pixels) as u8
    }
}
