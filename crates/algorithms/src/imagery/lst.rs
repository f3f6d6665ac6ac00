//! Land surface temperature
//!
//! Single-channel inversion of thermal brightness temperature with an
//! NDVI-derived emissivity:
//!
//! ```text
//! fv  = ((ndvi - ndvi_min) / (ndvi_max - ndvi_min))^2
//! em  = 0.004 * fv + 0.986
//! LST = TB / (1 + (0.00115 * TB / 1.438) * ln(em)) - 273.15
//! ```
//!
//! NDVI extrema are taken per scene over the zone pixels. A zone whose NDVI
//! is (numerically) constant has no defined vegetation fraction and gets no
//! LST value.

use serde::{Deserialize, Serialize};

use castor_core::raster::Raster;
use castor_core::Result;

/// Constants of the emissivity and inversion model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstParams {
    /// Emissivity gained between bare soil and full vegetation cover
    pub emissivity_slope: f64,
    /// Bare soil emissivity
    pub emissivity_base: f64,
    /// Effective wavelength term of the thermal band (λ, in the units of `rho`)
    pub wavelength: f64,
    /// h·c/σ
    pub rho: f64,
    /// NDVI ranges below this are treated as degenerate
    pub min_ndvi_range: f64,
}

impl Default for LstParams {
    fn default() -> Self {
        Self {
            emissivity_slope: 0.004,
            emissivity_base: 0.986,
            wavelength: 0.00115,
            rho: 1.438,
            min_ndvi_range: 1e-6,
        }
    }
}

/// Upper bound emissivity is clamped to so `ln(em)` stays negative.
const MAX_EMISSIVITY: f64 = 1.0 - 1e-9;

/// Squared scaled NDVI.
pub fn fractional_vegetation(ndvi: f64, ndvi_min: f64, ndvi_max: f64) -> f64 {
    let scaled = (ndvi - ndvi_min) / (ndvi_max - ndvi_min);
    scaled * scaled
}

pub fn emissivity(fv: f64, params: &LstParams) -> f64 {
    params.emissivity_slope * fv + params.emissivity_base
}

/// LST in °C for one pixel, `None` where the inputs are outside the model.
///
/// Emissivity must be positive and finite; values at or above 1 are clamped
/// just below 1.
pub fn pixel_lst(tb: f64, em: f64, params: &LstParams) -> Option<f64> {
    if !tb.is_finite() || !em.is_finite() || em <= 0.0 || tb <= 0.0 {
        return None;
    }
    let em = em.min(MAX_EMISSIVITY);
    let lst = tb / (1.0 + (params.wavelength * tb / params.rho) * em.ln()) - 273.15;
    lst.is_finite().then_some(lst)
}

/// Emissivity raster over the zone, `None` if the zone NDVI range is degenerate.
///
/// Pixels outside `mask` or without NDVI are NaN.
pub fn emissivity_raster(
    ndvi: &Raster<f64>,
    mask: &Raster<u8>,
    params: &LstParams,
) -> Result<Option<Raster<f64>>> {
    ndvi.check_same_shape(mask)?;

    let (min, max) = ndvi
        .data()
        .iter()
        .zip(mask.data().iter())
        .filter(|(v, &m)| m != 0 && v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (&v, _)| {
            (lo.min(v), hi.max(v))
        });

    if !min.is_finite() || !max.is_finite() || max - min < params.min_ndvi_range {
        return Ok(None);
    }

    let em = ndvi.zip_map(mask, |v, m| {
        if m == 0 || !v.is_finite() {
            f64::NAN
        } else {
            emissivity(fractional_vegetation(v, min, max), params)
        }
    })?;
    Ok(Some(em))
}

/// Per-pixel LST from brightness temperature (K) and emissivity.
///
/// Pixels rejected by [`pixel_lst`] are NaN, so masked means skip them.
pub fn lst_from_emissivity(
    thermal: &Raster<f64>,
    emissivity: &Raster<f64>,
    params: &LstParams,
) -> Result<Raster<f64>> {
    let mut out = thermal.zip_map(emissivity, |tb, em| {
        pixel_lst(tb, em, params).unwrap_or(f64::NAN)
    })?;
    out.set_nodata(Some(f64::NAN));
    Ok(out)
}

/// LST raster for one scene over one zone.
///
/// Returns `None` when the zone's NDVI range is degenerate.
pub fn land_surface_temperature(
    thermal: &Raster<f64>,
    ndvi: &Raster<f64>,
    mask: &Raster<u8>,
    params: &LstParams,
) -> Result<Option<Raster<f64>>> {
    match emissivity_raster(ndvi, mask, params)? {
        Some(em) => lst_from_emissivity(thermal, &em, params).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn full_vegetation_emissivity() {
        let p = LstParams::default();
        assert_relative_eq!(fractional_vegetation(0.8, 0.2, 0.8), 1.0);
        assert_relative_eq!(fractional_vegetation(0.5, 0.2, 0.8), 0.25);
        assert_relative_eq!(emissivity(1.0, &p), 0.990, epsilon = 1e-12);
        assert_relative_eq!(emissivity(0.0, &p), 0.986, epsilon = 1e-12);
    }

    #[test]
    fn lst_matches_closed_form() {
        let p = LstParams::default();
        let tb = 300.0;
        let em: f64 = 0.99;
        let expected = tb / (1.0 + (0.00115 * tb / 1.438) * em.ln()) - 273.15;
        assert_relative_eq!(pixel_lst(tb, em, &p).unwrap(), expected, epsilon = 1e-12);
        // Emissivity below 1 raises LST above the brightness temperature
        assert!(pixel_lst(tb, em, &p).unwrap() > tb - 273.15);
    }

    #[test]
    fn invalid_emissivity_is_excluded() {
        let p = LstParams::default();
        assert!(pixel_lst(300.0, 0.0, &p).is_none());
        assert!(pixel_lst(300.0, -0.5, &p).is_none());
        assert!(pixel_lst(300.0, f64::NAN, &p).is_none());
        assert!(pixel_lst(f64::NAN, 0.98, &p).is_none());
        // Clamped just below 1: essentially the brightness temperature
        let at_one = pixel_lst(300.0, 1.0, &p).unwrap();
        assert_relative_eq!(at_one, 300.0 - 273.15, epsilon = 1e-6);
    }

    #[test]
    fn constant_ndvi_has_no_lst() {
        let ndvi = Raster::filled(3, 3, 0.4);
        let thermal = Raster::filled(3, 3, 300.0);
        let mask = Raster::filled(3, 3, 1u8);
        let out = land_surface_temperature(&thermal, &ndvi, &mask, &LstParams::default()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn extrema_are_taken_inside_the_mask() {
        let mut ndvi = Raster::filled(2, 2, 0.5);
        ndvi.set(0, 0, 0.1).unwrap();
        ndvi.set(1, 1, 0.9).unwrap();
        let mut mask = Raster::filled(2, 2, 1u8);
        // Masking out both extremes leaves a constant zone
        mask.set(1, 1, 0).unwrap();
        mask.set(0, 0, 0).unwrap();

        let em = emissivity_raster(&ndvi, &mask, &LstParams::default()).unwrap();
        assert!(em.is_none());
    }

    #[test]
    fn zero_emissivity_pixel_becomes_nan() {
        let thermal = Raster::filled(2, 2, 300.0);
        let mut em = Raster::filled(2, 2, 0.98);
        em.set(0, 1, 0.0).unwrap();

        let lst = lst_from_emissivity(&thermal, &em, &LstParams::default()).unwrap();
        assert!(lst.get(0, 1).unwrap().is_nan());
        assert!(lst.get(0, 0).unwrap().is_finite());
        assert_eq!(lst.valid_count(), 3);
    }
}
