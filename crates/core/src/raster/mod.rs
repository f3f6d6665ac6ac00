//! Raster data structures for per-zone pixel blocks

mod element;
mod geotransform;
mod grid;
mod grid_spec;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::Raster;
pub use grid_spec::GridSpec;
