//! # Castor Cloud
//!
//! Client for the remote raster-processing service that hosts the imagery,
//! DEM and ET products.
//!
//! Every endpoint takes a whole chunk of requests, so one batch of the
//! pipeline is one HTTP call. Failures are classified into capacity, fatal
//! and transport errors and surface as [`castor_core::BackendError`] through
//! the blocking adapter.

pub mod auth;
pub mod blocking;
pub mod client;
pub mod error;
pub mod http;
pub mod models;

pub use auth::{BearerToken, CloudAuth, NoAuth};
pub use blocking::RasterServiceBlocking;
pub use client::{RasterServiceClient, ServiceOptions};
pub use error::{CloudError, Result};
