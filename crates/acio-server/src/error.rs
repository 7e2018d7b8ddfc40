//! Server-specific error types

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::api::response::ErrorResponse;
use crate::config::Environment;
use crate::db::DbError;

/// Result type alias for server operations
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Client-visible request errors.
///
/// Handlers and middleware return these as responses; the error chain
/// (`middleware::errors`) finds them through the [`ErrorReport`] extension and
/// renders the final envelope for the current environment.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Origin {origin} not allowed by CORS policy")]
    CorsViolation { origin: String },

    #[error("Route {method} {path} not found")]
    RouteNotFound { method: String, path: String },

    #[error("{message}")]
    RateLimited {
        code: &'static str,
        message: &'static str,
        retry_after_secs: u64,
    },

    #[error("Request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid JSON in request body: {0}")]
    InvalidJson(String),

    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::CorsViolation { .. } => StatusCode::FORBIDDEN,
            AppError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::InvalidJson(_) | AppError::InvalidPayload(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code carried in `error.code`
    pub fn code(&self) -> &'static str {
        match self {
            AppError::CorsViolation { .. } => "CORS_ERROR",
            AppError::RouteNotFound { .. } => "NOT_FOUND",
            AppError::RateLimited { code, .. } => *code,
            AppError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            AppError::InvalidJson(_) => "INVALID_JSON",
            AppError::InvalidPayload(_) => "INVALID_PAYLOAD",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Render the error envelope as the terminal handler does.
    ///
    /// Internal errors get a generic message in hardened mode; everywhere
    /// else the raw error text goes into `details`.
    pub fn to_error_response(&self, environment: Environment) -> ErrorResponse {
        let hardened = environment.is_hardened();
        let message = match self {
            AppError::Internal(_) if hardened => "An internal error occurred".to_string(),
            AppError::InvalidJson(_) => "Invalid JSON in request body".to_string(),
            AppError::InvalidPayload(_) => "Invalid request payload".to_string(),
            AppError::CorsViolation { .. } => {
                "Cross-Origin Resource Sharing policy violation".to_string()
            },
            other => other.to_string(),
        };

        let details = match self {
            AppError::InvalidJson(detail) | AppError::InvalidPayload(detail) if !hardened => {
                Some(json!(detail))
            },
            AppError::Internal(detail) if !hardened => Some(json!(detail)),
            AppError::PayloadTooLarge { limit } => Some(json!({ "limit": limit })),
            _ => None,
        };

        match details {
            Some(details) => ErrorResponse::with_details(self.code(), message, details),
            None => ErrorResponse::new(self.code(), message),
        }
    }
}

/// Response extension marking a response as an unrendered [`AppError`].
#[derive(Debug, Clone)]
pub struct ErrorReport(pub Arc<AppError>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_error_response(Environment::Production));
        let mut response = (status, body).into_response();

        if let AppError::RateLimited {
            retry_after_secs, ..
        } = &self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        response.extensions_mut().insert(ErrorReport(Arc::new(self)));
        response
    }
}

/// Startup and lifecycle faults. All of them end the process.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Database initialization failed: {0}")]
    Database(#[from] DbError),

    #[error("{address} requires elevated privileges")]
    PermissionDenied { address: String },

    #[error("{address} is already in use")]
    AddressInUse { address: String },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    /// Classify a listener bind failure
    pub fn from_bind(address: impl Into<String>, source: std::io::Error) -> Self {
        let address = address.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => ServerError::PermissionDenied { address },
            std::io::ErrorKind::AddrInUse => ServerError::AddressInUse { address },
            _ => ServerError::Bind { address, source },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_status_and_codes() {
        let cors = AppError::CorsViolation {
            origin: "https://evil.example".to_string(),
        };
        assert_eq!(cors.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(cors.code(), "CORS_ERROR");

        let limited = AppError::RateLimited {
            code: "AUTH_RATE_LIMIT_EXCEEDED",
            message: "Too many authentication attempts, please try again later.",
            retry_after_secs: 60,
        };
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.code(), "AUTH_RATE_LIMIT_EXCEEDED");

        assert_eq!(
            AppError::PayloadTooLarge { limit: 10 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(AppError::InvalidJson("x".into()).code(), "INVALID_JSON");
        assert!(AppError::Internal("boom".into()).is_internal());
    }

    #[test]
    fn test_internal_detail_hidden_in_production() {
        let err = AppError::Internal("disk on fire".to_string());

        let production = err.to_error_response(Environment::Production);
        assert_eq!(production.error.message, "An internal error occurred");
        assert!(production.error.details.is_none());

        let development = err.to_error_response(Environment::Development);
        assert!(development.error.message.contains("disk on fire"));
        assert_eq!(development.error.details, Some(json!("disk on fire")));
    }

    #[test]
    fn test_into_response_attaches_report() {
        let response = AppError::RateLimited {
            code: "RATE_LIMIT_EXCEEDED",
            message: "Too many requests from this IP, please try again later.",
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.0.code(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_bind_error_classification() {
        let denied = ServerError::from_bind("0.0.0.0:80", Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(denied, ServerError::PermissionDenied { .. }));

        let in_use = ServerError::from_bind("0.0.0.0:3001", Error::from(ErrorKind::AddrInUse));
        assert!(matches!(in_use, ServerError::AddressInUse { .. }));
        assert_eq!(in_use.to_string(), "0.0.0.0:3001 is already in use");

        let other = ServerError::from_bind("bogus", Error::from(ErrorKind::InvalidInput));
        assert!(matches!(other, ServerError::Bind { .. }));
    }
}
