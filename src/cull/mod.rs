// src/cull/mod.rs
// Spatial downsampling: grid culling for viewport markers, angular range
// culling for proximity overlays.

pub mod grid;
pub mod range;

pub use grid::{cull, GRID_DIM};
pub use range::cull_in_range;
