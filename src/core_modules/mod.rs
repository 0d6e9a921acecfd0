pub mod cell;
pub mod grid_engine;
pub mod grid_geometry;
pub mod luma_plane;
pub mod rotation;
