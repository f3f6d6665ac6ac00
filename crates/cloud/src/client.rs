//! Async client for the remote raster-processing service.
//!
//! One method per endpoint. Each takes a whole chunk of requests and answers
//! them in order; the response must hold exactly one entry per request.

use std::time::Duration;

use geo::Point;
use tracing::debug;

use castor_algorithms::imagery::ScaleFactors;
use castor_core::{EtRequest, GridSpec, Raster, SceneBands, SceneRecord, SceneRequest};

use crate::auth::{CloudAuth, NoAuth};
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::models::{
    float_raster, qa_raster, ElevationGridBody, ElevationGridResponse, ElevationSampleBody,
    ElevationSampleResponse, EtQuery, EtReduceBody, EtReduceResponse, SceneQuery,
    SceneSearchBody, SceneSearchResponse, SceneWire,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`RasterServiceClient`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Per-request timeout (default 120 s).
    pub request_timeout: Duration,
    /// Maximum retries on connection failures and timeouts (default 3).
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further one (default 500 ms).
    pub retry_backoff: Duration,
    /// Scale factors for services that return raw digital numbers.
    pub scale: ScaleFactors,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            scale: ScaleFactors::LANDSAT_C2_L2,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for the raster service.
pub struct RasterServiceClient {
    base_url: String,
    http: HttpClient,
    auth: Box<dyn CloudAuth>,
    scale: ScaleFactors,
}

impl RasterServiceClient {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, options: ServiceOptions) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout, options.max_retries)?
            .with_initial_backoff(options.retry_backoff);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            auth: Box::new(NoAuth),
            scale: options.scale,
        })
    }

    /// Sign every request with `auth`.
    pub fn with_auth(mut self, auth: impl CloudAuth + 'static) -> Self {
        self.auth = Box::new(auth);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL of an endpoint such as `"scenes:search"`.
    pub fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/{}", self.base_url, method)
    }

    // ── Scenes ──────────────────────────────────────────────────────

    /// Search and resample scenes for each request.
    pub async fn search_scenes(&self, requests: &[SceneRequest]) -> Result<Vec<Vec<SceneRecord>>> {
        let body = SceneSearchBody {
            requests: requests.iter().map(SceneQuery::from).collect(),
        };
        let resp: SceneSearchResponse = self.post("scenes:search", &body).await?;
        expect_entries("scenes:search", resp.results.len(), requests.len())?;

        let out = resp
            .results
            .into_iter()
            .zip(requests)
            .map(|(scenes, req)| {
                scenes
                    .into_iter()
                    .map(|s| self.scene_record(s, &req.grid))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            requests = requests.len(),
            scenes = out.iter().map(Vec::len).sum::<usize>(),
            "scene search complete"
        );
        Ok(out)
    }

    fn scene_record(&self, wire: SceneWire, grid: &GridSpec) -> Result<SceneRecord> {
        let mut bands = SceneBands {
            red: float_raster(&wire.bands.red, grid)?,
            green: float_raster(&wire.bands.green, grid)?,
            nir: float_raster(&wire.bands.nir, grid)?,
            thermal: float_raster(&wire.bands.thermal, grid)?,
            qa: qa_raster(&wire.bands.qa, grid)?,
        };
        if wire.digital_numbers {
            self.scale.apply(&mut bands);
        }
        Ok(SceneRecord {
            scene_id: wire.id,
            capture_date: wire.date,
            cloud_fraction: wire.cloud_cover,
            bands,
        })
    }

    // ── Elevation ───────────────────────────────────────────────────

    /// Elevation at each point, `None` outside DEM coverage.
    pub async fn sample_elevation(&self, points: &[Point<f64>]) -> Result<Vec<Option<f64>>> {
        let body = ElevationSampleBody {
            points: points.iter().map(|p| [p.x(), p.y()]).collect(),
        };
        let resp: ElevationSampleResponse = self.post("elevation:sample", &body).await?;
        expect_entries("elevation:sample", resp.elevations.len(), points.len())?;
        Ok(resp.elevations)
    }

    /// Elevation block on each grid, `None` outside DEM coverage.
    pub async fn elevation_grid(&self, grids: &[GridSpec]) -> Result<Vec<Option<Raster<f64>>>> {
        let body = ElevationGridBody {
            grids: grids.to_vec(),
        };
        let resp: ElevationGridResponse = self.post("elevation:grid", &body).await?;
        expect_entries("elevation:grid", resp.grids.len(), grids.len())?;

        resp.grids
            .into_iter()
            .zip(grids)
            .map(|(values, grid)| values.map(|v| float_raster(&v, grid)).transpose())
            .collect()
    }

    // ── Evapotranspiration ──────────────────────────────────────────

    /// Monthly ET mean over each masked zone.
    pub async fn reduce_et(&self, requests: &[EtRequest]) -> Result<Vec<Option<f64>>> {
        let body = EtReduceBody {
            requests: requests.iter().map(EtQuery::from).collect(),
        };
        let resp: EtReduceResponse = self.post("et:reduce", &body).await?;
        expect_entries("et:reduce", resp.values.len(), requests.len())?;
        // Non-finite reductions are absent, never zero
        Ok(resp
            .values
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect())
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post<B, R>(&self, method: &str, body: &B) -> Result<R>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(method);
        debug!(%url, "POST");
        self.http.post_json(&url, body, self.auth.as_ref()).await
    }
}

fn expect_entries(method: &str, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(CloudError::InvalidResponse(format!(
            "{method}: expected {want} entries, got {got}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BandsWire;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn client() -> RasterServiceClient {
        RasterServiceClient::new("https://raster.example.com/", ServiceOptions::default()).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let c = client();
        assert_eq!(c.base_url(), "https://raster.example.com");
        assert_eq!(c.endpoint("scenes:search"), "https://raster.example.com/v1/scenes:search");
        assert_eq!(c.endpoint("et:reduce"), "https://raster.example.com/v1/et:reduce");
    }

    #[test]
    fn digital_numbers_are_scaled() {
        let grid = GridSpec::around(Point::new(0.0, 0.0), 0.0, 30.0);
        assert_eq!(grid.len(), 1);
        let wire = SceneWire {
            id: "S1".into(),
            date: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
            cloud_cover: 5.0,
            digital_numbers: true,
            bands: BandsWire {
                red: vec![Some(10_000.0)],
                green: vec![Some(10_000.0)],
                nir: vec![None],
                thermal: vec![Some(44_000.0)],
                qa: vec![21824],
            },
        };
        let scene = client().scene_record(wire, &grid).unwrap();

        assert_relative_eq!(scene.bands.red.get(0, 0).unwrap(), 10_000.0 * 0.0000275 - 0.2);
        assert_relative_eq!(
            scene.bands.thermal.get(0, 0).unwrap(),
            44_000.0 * 0.00341802 + 149.0
        );
        assert!(scene.bands.nir.get(0, 0).unwrap().is_nan());
        assert_eq!(scene.bands.qa.get(0, 0).unwrap(), 21824);
        assert_eq!(scene.cloud_fraction, 5.0);
    }
}
