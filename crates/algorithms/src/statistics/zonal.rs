//! Zonal statistics
//!
//! A zone is the set of non-zero cells of a `u8` mask on the same grid as
//! the value raster. NaN values never contribute.

use castor_core::raster::Raster;
use castor_core::Result;

/// Result of zonal statistics for one zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalResult {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics of `values` over the cells selected by `mask`.
///
/// Returns `None` when no selected cell holds a finite value.
pub fn zonal_statistics(values: &Raster<f64>, mask: &Raster<u8>) -> Result<Option<ZonalResult>> {
    values.check_same_shape(mask)?;

    let mut count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (&v, &m) in values.data().iter().zip(mask.data().iter()) {
        if m == 0 || !v.is_finite() {
            continue;
        }
        count += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }

    if count == 0 {
        return Ok(None);
    }

    Ok(Some(ZonalResult {
        count,
        sum,
        mean: sum / count as f64,
        min,
        max,
    }))
}

/// Mean of `values` inside `mask`, `None` if nothing valid is inside.
pub fn masked_mean(values: &Raster<f64>, mask: &Raster<u8>) -> Result<Option<f64>> {
    Ok(zonal_statistics(values, mask)?.map(|z| z.mean))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zonal_basic() {
        let values = Raster::from_vec(vec![1.0, 2.0, 3.0, 4.0], 2, 2).unwrap();
        let mask = Raster::from_vec(vec![1u8, 1, 0, 1], 2, 2).unwrap();

        let z = zonal_statistics(&values, &mask).unwrap().unwrap();
        assert_eq!(z.count, 3);
        assert_relative_eq!(z.mean, 7.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(z.min, 1.0);
        assert_relative_eq!(z.max, 4.0);
    }

    #[test]
    fn nan_cells_are_skipped() {
        let values = Raster::from_vec(vec![1.0, f64::NAN, 3.0, f64::NAN], 2, 2).unwrap();
        let mask = Raster::filled(2, 2, 1u8);
        assert_relative_eq!(masked_mean(&values, &mask).unwrap().unwrap(), 2.0);
    }

    #[test]
    fn empty_zone_has_no_statistics() {
        let values = Raster::filled(2, 2, 5.0);
        let mask = Raster::new(2, 2);
        assert!(zonal_statistics(&values, &mask).unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let values = Raster::filled(2, 2, 5.0);
        let mask = Raster::filled(3, 2, 1u8);
        assert!(zonal_statistics(&values, &mask).is_err());
    }
}
