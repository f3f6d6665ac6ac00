//! Blocking (synchronous) API.
//!
//! Wraps the async [`RasterServiceClient`] with a Tokio runtime so the
//! pipeline, which schedules chunks on rayon threads, can use it through the
//! synchronous backend traits.

use geo::Point;

use castor_core::{
    BackendResult, ElevationBackend, EtRequest, EvapotranspirationBackend, GridSpec, Raster,
    SceneBackend, SceneRecord, SceneRequest,
};

use crate::auth::CloudAuth;
use crate::client::{RasterServiceClient, ServiceOptions};
use crate::error::{CloudError, Result};

/// Blocking wrapper around [`RasterServiceClient`].
///
/// Owns a small multi-threaded runtime so several rayon workers can block
/// on it at once.
pub struct RasterServiceBlocking {
    rt: tokio::runtime::Runtime,
    inner: RasterServiceClient,
}

impl RasterServiceBlocking {
    /// Create a new blocking client.
    pub fn new(base_url: &str, options: ServiceOptions) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))?;

        let inner = RasterServiceClient::new(base_url, options)?;
        Ok(Self { rt, inner })
    }

    /// Sign every request with `auth`.
    pub fn with_auth(mut self, auth: impl CloudAuth + 'static) -> Self {
        self.inner = self.inner.with_auth(auth);
        self
    }

    pub fn client(&self) -> &RasterServiceClient {
        &self.inner
    }
}

impl ElevationBackend for RasterServiceBlocking {
    fn sample_elevation(&self, points: &[Point<f64>]) -> BackendResult<Vec<Option<f64>>> {
        Ok(self.rt.block_on(self.inner.sample_elevation(points))?)
    }

    fn elevation_grid(&self, grids: &[GridSpec]) -> BackendResult<Vec<Option<Raster<f64>>>> {
        Ok(self.rt.block_on(self.inner.elevation_grid(grids))?)
    }
}

impl SceneBackend for RasterServiceBlocking {
    fn fetch_scenes(&self, requests: &[SceneRequest]) -> BackendResult<Vec<Vec<SceneRecord>>> {
        Ok(self.rt.block_on(self.inner.search_scenes(requests))?)
    }
}

impl EvapotranspirationBackend for RasterServiceBlocking {
    fn reduce_et(&self, requests: &[EtRequest]) -> BackendResult<Vec<Option<f64>>> {
        Ok(self.rt.block_on(self.inner.reduce_et(requests))?)
    }
}
