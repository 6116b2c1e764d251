//! Request-terminal error taxonomy shared by all endpoints.
//!
//! Token and binding failures deliberately map to the same generic message
//! so a caller cannot distinguish a forged token from a stolen one.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Bad MAC, malformed ciphertext, or expired TTL.
    #[error("invalid media token")]
    TokenInvalid,

    /// Decrypted client binding disagrees with the requester.
    #[error("invalid media token")]
    BindingMismatch,

    /// Referer/origin, secret, or signature gate failed.
    #[error("request not admitted")]
    AdmissionDenied,

    /// Missing or wrong pre-shared secret on the metadata endpoint.
    #[error("unauthorized")]
    Unauthorized,

    /// Origin probe did not answer with a success status.
    #[error("content not found")]
    UpstreamNotFound,

    /// Origin fetch failed, timed out, or returned a non-success status.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Malformed or out-of-bounds `Range` header.
    #[error("invalid request range ({0})")]
    RangeUnsatisfiable(String),

    /// Origin manifest failed to parse.
    #[error("malformed manifest: {0}")]
    ManifestMalformed(String),

    /// The extraction engine rejected or failed the lookup.
    #[error("extraction failed: {0}")]
    Extraction(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::TokenInvalid | ProxyError::BindingMismatch => StatusCode::BAD_REQUEST,
            ProxyError::AdmissionDenied => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::UpstreamNotFound => StatusCode::NOT_FOUND,
            ProxyError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::RangeUnsatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            ProxyError::ManifestMalformed(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProxyError::Extraction(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_binding_errors_share_a_message() {
        assert_eq!(
            ProxyError::TokenInvalid.to_string(),
            ProxyError::BindingMismatch.to_string()
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ProxyError::TokenInvalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ProxyError::RangeUnsatisfiable("x".into()).status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ProxyError::UpstreamUnavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ProxyError::UpstreamNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ProxyError::ManifestMalformed("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
