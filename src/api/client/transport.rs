//! HTTP transport helpers shared by every endpoint.

use crate::error::ApiError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use std::time::{Duration, SystemTime};

/// Build an HTTP client with timeout applied.
pub(super) fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// `Retry-After` as whole seconds, accepting both delta-seconds and HTTP-date.
pub(super) fn parse_retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }
    let at = httpdate::parse_http_date(raw).ok()?;
    let wait = at.duration_since(SystemTime::now()).unwrap_or_default();
    Some(wait.as_secs())
}

/// Turn a non-2xx response into [`ApiError::Status`].
pub(super) async fn error_for_status(response: reqwest::Response) -> ApiError {
    let code = response.status().as_u16();
    let retry_after_secs = parse_retry_after_secs(response.headers());
    let body = response.text().await.unwrap_or_default();
    ApiError::status(code, body, retry_after_secs)
}

/// Read a successful response body as JSON.
pub(super) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    if !response.status().is_success() {
        return Err(error_for_status(response).await);
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}
