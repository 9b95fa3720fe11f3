//! Error types for stream-gate.
//!
//! The variants double as the client-facing taxonomy: each maps to exactly
//! one HTTP status and a fixed, detail-free response body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by stream-gate.
#[derive(Debug, Error)]
pub enum Error {
    /// The identity is not a valid wallet address.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The request body or parameters are malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Chain state could not be observed. Retryable with backoff.
    #[error("entitlement source unavailable: {0}")]
    Unavailable(String),

    /// Holdings do not satisfy the gating rule.
    #[error("insufficient entitlement")]
    InsufficientEntitlement,

    /// The capability token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The capability token is forged, malformed or already redeemed.
    #[error("token invalid")]
    TokenInvalid,

    /// A proof of key possession was missing or did not verify.
    #[error("proof of key possession rejected: {0}")]
    ProofRejected(String),

    /// The identity exceeded its request budget.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window closes.
        retry_after_secs: u64,
    },

    /// The content is unknown or has been withdrawn.
    #[error("content not found: {0}")]
    ContentNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentity(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InsufficientEntitlement => StatusCode::FORBIDDEN,
            Self::TokenExpired | Self::TokenInvalid | Self::ProofRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ContentNotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code returned to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unavailable(_) => "unavailable",
            Self::InsufficientEntitlement => "insufficient_entitlement",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::ProofRejected(_) => "proof_rejected",
            Self::RateLimited { .. } => "rate_limited",
            Self::ContentNotFound(_) => "not_found",
            Self::Config(_) | Self::Io(_) => "internal",
        }
    }

    /// Whether the client may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Never echo the inner message: it may describe chain or store state.
        let status = self.status_code();
        let body = Json(json!({
            "error": self.code(),
            "retryable": self.is_retryable(),
        }));

        let mut response = (status, body).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            response.headers_mut().insert(
                axum::http::header::RETRY_AFTER,
                axum::http::HeaderValue::from(retry_after_secs),
            );
        }
        response
    }
}
