//! Scene screening from cloud cover and QA bits

use serde::{Deserialize, Serialize};

use castor_core::raster::Raster;
use castor_core::{Result, SceneRecord};

/// Thresholds a scene must meet to contribute metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudFilter {
    /// Scene-level cloud cover above this (percent) excludes the scene
    pub max_scene_cloud_percent: f64,
    /// QA_PIXEL bits that flag a pixel. Defaults to 3 (cloud) and 5 (snow),
    /// the pair the calibrated series were masked with. Bit 5 is not the
    /// cloud-shadow bit; shadow (bit 4) is screened only when added here.
    pub qa_bits: Vec<u8>,
    /// Largest tolerated share of flagged in-zone pixels
    pub max_flagged_fraction: f64,
}

impl Default for CloudFilter {
    fn default() -> Self {
        Self {
            max_scene_cloud_percent: 20.0,
            qa_bits: vec![3, 5],
            max_flagged_fraction: 0.0,
        }
    }
}

/// Outcome of screening one scene against one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneVerdict {
    Clear,
    /// Scene cloud cover above the threshold
    CloudCover,
    /// Too many in-zone pixels carry a QA flag
    QaFlagged,
    /// The zone mask selects no pixel
    Empty,
}

impl SceneVerdict {
    pub fn is_clear(self) -> bool {
        self == Self::Clear
    }
}

impl CloudFilter {
    /// Bit mask of the configured QA bits.
    pub fn qa_mask(&self) -> u16 {
        self.qa_bits
            .iter()
            .filter(|&&b| b < 16)
            .fold(0u16, |acc, &b| acc | (1 << b))
    }

    pub fn is_flagged(&self, qa: u16) -> bool {
        qa & self.qa_mask() != 0
    }

    /// Screen `scene` over the pixels selected by `mask`.
    pub fn assess(&self, scene: &SceneRecord, mask: &Raster<u8>) -> Result<SceneVerdict> {
        if scene.cloud_fraction > self.max_scene_cloud_percent {
            return Ok(SceneVerdict::CloudCover);
        }
        scene.bands.qa.check_same_shape(mask)?;

        let bits = self.qa_mask();
        let (in_zone, flagged) = scene
            .bands
            .qa
            .data()
            .iter()
            .zip(mask.data().iter())
            .filter(|(_, &m)| m != 0)
            .fold((0usize, 0usize), |(n, f), (&qa, _)| {
                (n + 1, f + usize::from(qa & bits != 0))
            });

        if in_zone == 0 {
            return Ok(SceneVerdict::Empty);
        }
        if flagged as f64 / in_zone as f64 > self.max_flagged_fraction {
            return Ok(SceneVerdict::QaFlagged);
        }
        Ok(SceneVerdict::Clear)
    }
}
