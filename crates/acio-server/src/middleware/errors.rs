//! Error chain
//!
//! The outermost stage of the pipeline. Responses carrying an
//! [`ErrorReport`] are re-rendered by the first stage that claims them, in
//! this order:
//!
//! 1. CORS translator: `403 CORS_ERROR`
//! 2. Route-not-found responder: `404 NOT_FOUND`
//! 3. Terminal handler: everything else
//!
//! Headers set further in (security headers, `X-Request-ID`, `Retry-After`,
//! rate-limit policy) are kept.

use axum::{
    extract::{Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::request_id::REQUEST_ID_HEADER;
use crate::api::response::ErrorResponse;
use crate::config::Environment;
use crate::error::{AppError, ErrorReport};

/// Render CORS denials. Details only in development.
pub fn translate_cors(error: &AppError, environment: Environment) -> Option<ErrorResponse> {
    let AppError::CorsViolation { .. } = error else {
        return None;
    };

    let message = "Cross-Origin Resource Sharing policy violation";
    Some(if environment.is_relaxed() {
        ErrorResponse::with_details(error.code(), message, json!(error.to_string()))
    } else {
        ErrorResponse::new(error.code(), message)
    })
}

/// Render unmatched routes
pub fn respond_not_found(error: &AppError) -> Option<ErrorResponse> {
    match error {
        AppError::RouteNotFound { .. } => Some(ErrorResponse::new(error.code(), error.to_string())),
        _ => None,
    }
}

/// Render and log everything the earlier stages passed on
pub fn terminal_handler(
    error: &AppError,
    environment: Environment,
    request_id: &str,
    method: &Method,
    path: &str,
) -> ErrorResponse {
    if error.is_internal() {
        tracing::error!(
            request_id,
            %method,
            path,
            code = error.code(),
            error = %error,
            "Request failed"
        );
    } else {
        tracing::warn!(
            request_id,
            %method,
            path,
            code = error.code(),
            error = %error,
            "Request rejected"
        );
    }

    error.to_error_response(environment)
}

pub async fn render_errors(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let Some(ErrorReport(error)) = response.extensions().get::<ErrorReport>().cloned() else {
        return response;
    };

    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
        .to_owned();

    let body = translate_cors(&error, environment)
        .or_else(|| respond_not_found(&error))
        .unwrap_or_else(|| terminal_handler(&error, environment, &request_id, &method, &path));

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_TYPE);
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_ENCODING);

    let mut rendered = (parts.status, Json(body)).into_response();
    rendered.headers_mut().extend(parts.headers);
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cors_error() -> AppError {
        AppError::CorsViolation {
            origin: "https://evil.example".to_string(),
        }
    }

    #[test]
    fn test_cors_translator_claims_only_cors_errors() {
        let dev = translate_cors(&cors_error(), Environment::Development).unwrap_or_else(|| {
            ErrorResponse::new("MISSING", "translator declined a CORS error")
        });
        assert_eq!(dev.error.code, "CORS_ERROR");
        assert_eq!(
            dev.error.details,
            Some(json!("Origin https://evil.example not allowed by CORS policy"))
        );

        let prod = translate_cors(&cors_error(), Environment::Production);
        assert!(prod.is_some_and(|body| body.error.details.is_none()));

        assert!(translate_cors(&AppError::Internal("x".into()), Environment::Development).is_none());
    }

    #[test]
    fn test_not_found_message() {
        let error = AppError::RouteNotFound {
            method: "GET".to_string(),
            path: "/nope".to_string(),
        };
        let body = respond_not_found(&error);
        assert!(body.is_some_and(|body| body.error.message == "Route GET /nope not found"));
        assert!(respond_not_found(&cors_error()).is_none());
    }

    #[test]
    fn test_terminal_handler_hides_internals_in_production() {
        let error = AppError::Internal("pool exhausted".to_string());
        let body = terminal_handler(&error, Environment::Production, "id", &Method::GET, "/");
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert_eq!(body.error.message, "An internal error occurred");
        assert!(body.error.details.is_none());
    }
}
