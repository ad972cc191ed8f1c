//! API error type. Every failure leaves the daemon as `{ error, detail }`
//! JSON with a machine-readable code.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tdb_md::ProviderError;

use crate::api_types::ErrorResponse;

#[derive(Debug)]
pub enum ApiError {
    MissingUserId,
    InvalidDate(String),
    InvalidRange { from: String, to: String },
    Provider(ProviderError),
    Persistence(String),
    RateLimited,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingUserId => "MISSING_USER_ID",
            ApiError::InvalidDate(_) => "INVALID_DATE",
            ApiError::InvalidRange { .. } => "INVALID_RANGE",
            ApiError::Provider(_) => "PROVIDER_ERROR",
            ApiError::Persistence(_) => "PERSISTENCE_ERROR",
            ApiError::RateLimited => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingUserId | ApiError::InvalidDate(_) | ApiError::InvalidRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            // upstream 5xx passes through; anything else is a bad gateway
            ApiError::Provider(e) => e
                .upstream_status()
                .filter(|s| *s >= 500)
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Persistence failure from an `anyhow` chain; `{:#}` keeps the context.
    pub fn persistence(err: &anyhow::Error) -> Self {
        ApiError::Persistence(format!("{err:#}"))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::MissingUserId => {
                write!(f, "user id required: x-user-id header or user_id query")
            }
            ApiError::InvalidDate(raw) => write!(f, "expected YYYY-MM-DD, got '{raw}'"),
            ApiError::InvalidRange { from, to } => write!(f, "from {from} is after to {to}"),
            ApiError::Provider(e) => write!(f, "{e}"),
            ApiError::Persistence(msg) => write!(f, "{msg}"),
            ApiError::RateLimited => write!(f, "too many requests"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        ApiError::Provider(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }
        let body = ErrorResponse {
            error: self.code().to_string(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        let e503 = ApiError::Provider(ProviderError::Api {
            status: Some(503),
            message: "down".into(),
        });
        assert_eq!(e503.status(), StatusCode::SERVICE_UNAVAILABLE);

        let e401 = ApiError::Provider(ProviderError::Api {
            status: Some(401),
            message: "nope".into(),
        });
        assert_eq!(e401.status(), StatusCode::BAD_GATEWAY);

        let timeout = ApiError::Provider(ProviderError::Timeout("t".into()));
        assert_eq!(timeout.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(timeout.code(), "PROVIDER_ERROR");
    }

    #[test]
    fn validation_errors_are_400() {
        assert_eq!(ApiError::MissingUserId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::InvalidDate("2024-13-01".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn persistence_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("upsert trade_slices failed");
        let api = ApiError::persistence(&err);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code(), "PERSISTENCE_ERROR");
        assert_eq!(api.to_string(), "upsert trade_slices failed: connection refused");
    }
}
