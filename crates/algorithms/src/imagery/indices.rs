//! Spectral vegetation and water indices
//!
//! Both indices are normalized differences of two reflectance bands. Scaled
//! Collection 2 reflectance can be slightly negative, which pushes the ratio
//! outside [-1, 1]; such pixels are clamped and flagged so the caller can
//! report how many were touched.

use ndarray::Array2;

use crate::maybe_rayon::*;
use castor_core::raster::Raster;
use castor_core::{Error, Result};

/// A normalized-difference raster plus the pixels that had to be clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRaster {
    /// Index values in [-1, 1], NaN where undefined
    pub values: Raster<f64>,
    /// 1 where the raw ratio fell outside [-1, 1]
    pub clamped: Raster<u8>,
}

impl IndexRaster {
    /// Clamped pixels inside `mask`.
    pub fn clamped_within(&self, mask: &Raster<u8>) -> Result<usize> {
        self.clamped.check_same_shape(mask)?;
        Ok(self
            .clamped
            .data()
            .iter()
            .zip(mask.data().iter())
            .filter(|(&c, &m)| c != 0 && m != 0)
            .count())
    }
}

// ---------------------------------------------------------------------------
// Generic normalized difference
// ---------------------------------------------------------------------------

/// `(band_a - band_b) / (band_a + band_b)`, clamped to [-1, 1].
///
/// Pixels where either band is no-data or the denominator is zero are NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<IndexRaster> {
    band_a.check_same_shape(band_b)?;

    let (rows, cols) = band_a.shape();
    let a = band_a.data();
    let b = band_b.data();

    let row_results: Vec<(Vec<f64>, Vec<u8>)> = (0..rows)
        .into_par_iter()
        .map(|row| {
            let mut values = vec![f64::NAN; cols];
            let mut clamped = vec![0u8; cols];
            for col in 0..cols {
                let va = a[(row, col)];
                let vb = b[(row, col)];

                if band_a.is_nodata(va) || band_b.is_nodata(vb) {
                    continue;
                }

                let sum = va + vb;
                if sum.abs() < 1e-10 {
                    continue;
                }

                let nd = (va - vb) / sum;
                if !nd.is_finite() {
                    continue;
                }
                if !(-1.0..=1.0).contains(&nd) {
                    clamped[col] = 1;
                }
                values[col] = nd.clamp(-1.0, 1.0);
            }
            (values, clamped)
        })
        .collect();

    let mut values = Vec::with_capacity(rows * cols);
    let mut clamped = Vec::with_capacity(rows * cols);
    for (v, c) in row_results {
        values.extend(v);
        clamped.extend(c);
    }

    let transform = *band_a.transform();
    let mut values = Raster::from_array(to_array(values, rows, cols)?).with_transform(transform);
    values.set_nodata(Some(f64::NAN));
    let clamped = Raster::from_array(to_array(clamped, rows, cols)?).with_transform(transform);

    Ok(IndexRaster { values, clamped })
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// Dense riparian vegetation sits around 0.6 to 0.9, open water below 0.
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<IndexRaster> {
    normalized_difference(nir, red)
}

/// Normalized Difference Water Index (McFeeters, 1996)
///
/// `NDWI = (Green - NIR) / (Green + NIR)`
///
/// Positive values indicate open water.
pub fn ndwi(green: &Raster<f64>, nir: &Raster<f64>) -> Result<IndexRaster> {
    normalized_difference(green, nir)
}

fn to_array<T>(data: Vec<T>, rows: usize, cols: usize) -> Result<Array2<T>> {
    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use castor_core::GeoTransform;

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        Raster::filled(rows, cols, value).with_transform(GeoTransform::new(
            0.0,
            rows as f64,
            1.0,
            -1.0,
        ))
    }

    #[test]
    fn test_ndvi_basic() {
        let nir = make_band(3, 3, 0.4);
        let red = make_band(3, 3, 0.1);
        let out = ndvi(&nir, &red).unwrap();

        // (0.4 - 0.1) / (0.4 + 0.1) = 0.6
        assert_relative_eq!(out.values.get(1, 1).unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(out.clamped.get(1, 1).unwrap(), 0);
    }

    #[test]
    fn test_ndwi_water_is_positive() {
        let green = make_band(2, 2, 0.08);
        let nir = make_band(2, 2, 0.02);
        let out = ndwi(&green, &nir).unwrap();
        assert!(out.values.get(0, 0).unwrap() > 0.0);
    }

    #[test]
    fn zero_denominator_is_nan() {
        let a = make_band(2, 2, 0.0);
        let b = make_band(2, 2, 0.0);
        let out = normalized_difference(&a, &b).unwrap();
        assert!(out.values.get(0, 0).unwrap().is_nan());
    }

    #[test]
    fn negative_reflectance_is_clamped_and_counted() {
        let nir = make_band(2, 2, 0.3);
        let mut red = make_band(2, 2, 0.1);
        // Slightly negative after scaling: ratio > 1
        red.set(0, 0, -0.05).unwrap();

        let out = ndvi(&nir, &red).unwrap();
        assert_relative_eq!(out.values.get(0, 0).unwrap(), 1.0);
        assert_eq!(out.clamped.get(0, 0).unwrap(), 1);

        let mut mask = Raster::filled(2, 2, 1u8);
        assert_eq!(out.clamped_within(&mask).unwrap(), 1);
        mask.set(0, 0, 0).unwrap();
        assert_eq!(out.clamped_within(&mask).unwrap(), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = make_band(3, 3, 0.1);
        let b = make_band(4, 3, 0.1);
        assert!(normalized_difference(&a, &b).is_err());
    }
}
