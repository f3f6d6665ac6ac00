//! Imagery algorithms
//!
//! - Spectral indices: NDVI, NDWI on a clamped normalized difference
//! - Cloud screening from scene cover and QA bits
//! - Land surface temperature from brightness temperature and NDVI emissivity
//! - Landsat Collection 2 scale factors

mod calibration;
mod cloud_mask;
mod indices;
mod lst;

pub use calibration::ScaleFactors;
pub use cloud_mask::{CloudFilter, SceneVerdict};
pub use indices::{ndvi, ndwi, normalized_difference, IndexRaster};
pub use lst::{
    emissivity, emissivity_raster, fractional_vegetation, land_surface_temperature,
    lst_from_emissivity, pixel_lst, LstParams,
};
