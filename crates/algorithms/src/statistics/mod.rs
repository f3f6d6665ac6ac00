//! Statistical reductions over zone masks
//!
//! - **zonal**: count / mean / min / max of a value raster inside a mask

pub mod zonal;

pub use zonal::{masked_mean, zonal_statistics, ZonalResult};
