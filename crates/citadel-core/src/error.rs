//! Error types for citadel-core

use std::fmt;

use thiserror::Error;

/// An HTTP error returned by an upstream ML service.
///
/// Carries the status code and a capped copy of the response body so callers
/// can branch on status without re-reading the response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub body: String,
    /// Which service returned the error (empty when unknown).
    pub service: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service.is_empty() {
            write!(f, "HTTP {}: {}", self.status, self.body)
        } else {
            write!(f, "{}: HTTP {}: {}", self.service, self.status, self.body)
        }
    }
}

impl std::error::Error for ApiError {}

/// Errors that can occur inside the detection engine.
///
/// The variant names are stable across releases; callers match on them for
/// degradation decisions. Only `InvalidInput` is ever surfaced to API
/// callers — everything else degrades into a missing signal.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// YAML config missing or malformed; the scorer falls back to embedded
    /// defaults.
    #[error("Config load failed: {0}")]
    ConfigLoad(String),

    /// Model file or native runtime missing; the affected adapter reports
    /// not-ready.
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Gzip output or recursion limit hit; the decoded variant is discarded.
    #[error("Decoder overflow: {0}")]
    DecoderOverflow(String),

    /// A detector exceeded its per-call deadline; its signal is omitted.
    #[error("Detector timed out: {0}")]
    DetectorTimeout(String),

    /// A cloud service returned a non-2xx response; the signal is omitted.
    #[error(transparent)]
    Upstream(#[from] ApiError),

    /// Empty or non-UTF-8 input; surfaced to the caller, no detection runs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for citadel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Build an [`ApiError`] from a reqwest response, reading at most 4 KiB of
/// the body.
pub async fn check_response(resp: reqwest::Response, service: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let mut end = body.len().min(4096);
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }

    Err(Error::Upstream(ApiError {
        status: status.as_u16(),
        body: body[..end].to_string(),
        service: service.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_service() {
        let e = ApiError {
            status: 429,
            body: "Rate limit exceeded".to_string(),
            service: "safeguard".to_string(),
        };
        let s = e.to_string();
        assert!(s.contains("429"));
        assert!(s.contains("safeguard"));
        assert!(s.contains("Rate limit exceeded"));
    }

    #[test]
    fn error_variants_are_stable_names() {
        let e = Error::DetectorTimeout("bert".to_string());
        assert!(e.to_string().contains("bert"));
        let e = Error::InvalidInput("empty text".to_string());
        assert!(e.to_string().contains("empty text"));
    }
}
