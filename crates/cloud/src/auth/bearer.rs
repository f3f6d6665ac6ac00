//! Static bearer token authentication.

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Attaches `Authorization: Bearer <token>` to every request.
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Read the token from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        std::env::var(var)
            .map(Self::new)
            .map_err(|_| CloudError::Auth(format!("environment variable {var} is not set")))
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken").field("token", &"***").finish()
    }
}

impl CloudAuth for BearerToken {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(CloudError::Auth("empty bearer token".into()));
        }
        headers.push(("Authorization".into(), format!("Bearer {}", self.token)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_authorization_header() {
        let mut headers = Vec::new();
        BearerToken::new("abc123")
            .sign_request("https://example.com/v1/et:reduce", "POST", &mut headers)
            .unwrap();
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer abc123".to_string())]);
    }

    #[test]
    fn empty_token_is_an_auth_error() {
        let mut headers = Vec::new();
        let err = BearerToken::new("  ")
            .sign_request("https://example.com", "POST", &mut headers)
            .unwrap_err();
        assert!(matches!(err, CloudError::Auth(_)));
        assert!(headers.is_empty());
    }

    #[test]
    fn debug_hides_the_token() {
        assert!(!format!("{:?}", BearerToken::new("secret")).contains("secret"));
    }
}
