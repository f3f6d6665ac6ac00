//! Cell value trait for zone and scene rasters

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Types a [`Raster`](super::Raster) can hold: `f64` scene bands, `u16`
/// QA codes and `u8` zone masks.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Whether the value is missing. Float NaN is always missing.
    fn is_nodata(&self, nodata: Option<Self>) -> bool;
}

impl RasterElement for u8 {
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        nodata == Some(*self)
    }
}

impl RasterElement for u16 {
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        nodata == Some(*self)
    }
}

impl RasterElement for f64 {
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        self.is_nan() || nodata.is_some_and(|nd| (self - nd).abs() < f64::EPSILON * 100.0)
    }
}
