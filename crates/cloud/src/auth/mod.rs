//! Request authentication for the raster service.

mod bearer;
mod none;

pub use bearer::BearerToken;
pub use none::NoAuth;

use crate::error::Result;

/// Trait for signing HTTP requests to the raster service.
///
/// Implementations add authentication headers to outgoing requests before
/// they are sent.
pub trait CloudAuth: Send + Sync {
    /// Sign a request by adding authentication headers.
    ///
    /// `url` is the full request URL, `headers` collects the headers to add.
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
