//! Landsat Collection 2 Level-2 scale factors

use serde::{Deserialize, Serialize};

use castor_core::raster::Raster;
use castor_core::SceneBands;

/// Linear conversion from stored digital numbers to physical units.
///
/// `reflectance = dn * optical_scale + optical_offset`,
/// `kelvin = dn * thermal_scale + thermal_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub optical_scale: f64,
    pub optical_offset: f64,
    pub thermal_scale: f64,
    pub thermal_offset: f64,
}

impl ScaleFactors {
    /// Landsat 8/9 Collection 2 surface reflectance and ST_B10
    pub const LANDSAT_C2_L2: Self = Self {
        optical_scale: 0.000_027_5,
        optical_offset: -0.2,
        thermal_scale: 0.003_418_02,
        thermal_offset: 149.0,
    };

    pub fn optical(&self, dn: f64) -> f64 {
        dn * self.optical_scale + self.optical_offset
    }

    pub fn thermal(&self, dn: f64) -> f64 {
        dn * self.thermal_scale + self.thermal_offset
    }

    /// Scale every band of a scene in place. The QA band is left untouched.
    pub fn apply(&self, bands: &mut SceneBands) {
        scale_in_place(&mut bands.red, |v| self.optical(v));
        scale_in_place(&mut bands.green, |v| self.optical(v));
        scale_in_place(&mut bands.nir, |v| self.optical(v));
        scale_in_place(&mut bands.thermal, |v| self.thermal(v));
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self::LANDSAT_C2_L2
    }
}

fn scale_in_place(band: &mut Raster<f64>, f: impl Fn(f64) -> f64) {
    band.data_mut().mapv_inplace(|v| if v.is_nan() { v } else { f(v) });
}
