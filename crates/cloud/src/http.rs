//! HTTP client wrapper with JSON requests, failure classification and retry.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Response bodies mentioning one of these are capacity failures whatever
/// the status code.
const CAPACITY_MESSAGES: &[&str] = &["memory limit", "too many", "computation timed out"];

/// HTTP client for JSON calls against the raster service.
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    initial_backoff: Duration,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CloudError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries,
            initial_backoff: Duration::from_millis(500),
            request_timeout,
        })
    }

    /// Override the first retry delay (later delays double).
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// POST `body` as JSON and decode the JSON response.
    ///
    /// Non-success statuses are classified with [`classify_failure`]. Only
    /// network-level failures are retried here.
    pub async fn post_json<B, R>(&self, url: &str, body: &B, auth: &dyn CloudAuth) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut auth_headers = Vec::new();
        auth.sign_request(url, "POST", &mut auth_headers)?;

        let mut req = self.client.post(url).json(body);
        for (key, value) in &auth_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = self.execute_with_retry(req).await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            let err = classify_failure(status, &text);
            debug!(url, status = status.as_u16(), %err, "request failed");
            return Err(err);
        }

        serde_json::from_str(&text).map_err(|e| {
            CloudError::InvalidResponse(format!("decoding response from {url}: {e}"))
        })
    }

    /// Execute a request with exponential backoff retry on connection
    /// failures and timeouts.
    async fn execute_with_retry(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.initial_backoff * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            let Some(cloned) = request.try_clone() else {
                return Ok(request.send().await?);
            };
            match cloned.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(attempt, error = %e, "transient network failure");
                    last_err = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(last_err
            .map(CloudError::from)
            .unwrap_or_else(|| CloudError::Network("request failed".into())))
    }

    /// Getter for the timeout duration.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Classify a non-success response.
///
/// 413, 503, 504 and 507, or a body naming a memory, size or time limit,
/// mean the request was too big. 401 and 403, and 429 citing a quota, can
/// never succeed on retry.
pub fn classify_failure(status: StatusCode, body: &str) -> CloudError {
    let message = error_message(body);
    let lower = message.to_lowercase();
    let code = status.as_u16();

    match code {
        401 | 403 => CloudError::Rejected { status: code, message },
        429 if lower.contains("quota") => CloudError::Rejected { status: code, message },
        413 | 429 | 503 | 504 | 507 => CloudError::Capacity { status: code, message },
        _ if CAPACITY_MESSAGES.iter().any(|m| lower.contains(m)) => {
            CloudError::Capacity { status: code, message }
        }
        _ => CloudError::Status { status: code, message },
    }
}

/// Pull a readable message out of an error body.
///
/// Understands `{"error": {"message": ..}}`, `{"error": ..}` and
/// `{"message": ..}`; anything else is returned truncated.
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        let found = v["error"]["message"]
            .as_str()
            .or_else(|| v["error"].as_str())
            .or_else(|| v["message"].as_str());
        if let Some(m) = found {
            return m.to_string();
        }
    }
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: u16, body: &str) -> CloudError {
        classify_failure(StatusCode::from_u16(code).unwrap(), body)
    }

    #[test]
    fn size_statuses_are_capacity() {
        for code in [413, 503, 504, 507] {
            assert!(matches!(classify(code, ""), CloudError::Capacity { .. }), "{code}");
        }
    }

    #[test]
    fn capacity_messages_win_over_status() {
        let err = classify(400, r#"{"error": {"message": "User memory limit exceeded."}}"#);
        assert!(matches!(err, CloudError::Capacity { status: 400, .. }));

        let err = classify(500, "Computation timed out.");
        assert!(matches!(err, CloudError::Capacity { .. }));

        let err = classify(400, r#"{"error": "Too many pixels in the region"}"#);
        assert!(matches!(err, CloudError::Capacity { .. }));
    }

    #[test]
    fn auth_and_quota_are_rejected() {
        assert!(matches!(classify(401, ""), CloudError::Rejected { .. }));
        assert!(matches!(classify(403, "forbidden"), CloudError::Rejected { .. }));
        assert!(matches!(
            classify(429, r#"{"message": "Daily quota exceeded"}"#),
            CloudError::Rejected { .. }
        ));
        assert!(matches!(classify(429, "slow down"), CloudError::Capacity { .. }));
    }

    #[test]
    fn other_failures_keep_their_status() {
        let err = classify(400, r#"{"error": {"message": "unknown collection"}}"#);
        match err {
            CloudError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown collection");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
