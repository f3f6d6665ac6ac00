//! Vector geometry helpers
//!
//! - **buffer**: circular buffers around WGS84 points, sized in meters

pub mod buffer;

pub use buffer::{buffer_point, BufferParams};
