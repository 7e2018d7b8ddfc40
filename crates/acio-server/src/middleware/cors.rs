//! CORS origin policy
//!
//! The decision is made by [`CorsPolicy`]; denied requests become
//! [`AppError::CorsViolation`] and are rendered by the error chain. Allowed
//! requests continue into the `tower-http` CORS layer built by
//! [`super::cors_layer`], which answers preflights and adds the response
//! headers.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::config::{CorsConfig, Environment};
use crate::error::AppError;

#[allow(clippy::expect_used)]
static LOCALHOST_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^http://localhost:\d+$").expect("valid localhost origin pattern")
});

#[allow(clippy::expect_used)]
static LOOPBACK_ORIGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^http://127\.0\.0\.1:\d+$").expect("valid loopback origin pattern")
});

/// Outcome of evaluating a request origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision {
    Allow,
    Deny,
}

/// Decides which origins may talk to the API
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<String>,
    allow_loopback: bool,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig, environment: Environment) -> Self {
        Self {
            allowed_origins: config.allowed_origins.clone(),
            allow_loopback: environment.is_relaxed(),
        }
    }

    /// Evaluate the request's declared origin.
    ///
    /// Requests without an origin come from non-browser clients and are
    /// always allowed.
    pub fn evaluate(&self, origin: Option<&str>) -> CorsDecision {
        let Some(origin) = origin else {
            return CorsDecision::Allow;
        };

        let listed = self.allowed_origins.iter().any(|allowed| allowed == origin);
        let loopback = self.allow_loopback
            && (LOCALHOST_ORIGIN.is_match(origin) || LOOPBACK_ORIGIN.is_match(origin));

        if listed || loopback {
            CorsDecision::Allow
        } else {
            CorsDecision::Deny
        }
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        origin
            .to_str()
            .map(|origin| self.evaluate(Some(origin)) == CorsDecision::Allow)
            .unwrap_or(false)
    }
}

/// Reject requests from origins the policy denies
pub async fn enforce_cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    match origin {
        Some(origin) if !policy.allows(&origin) => AppError::CorsViolation {
            origin: String::from_utf8_lossy(origin.as_bytes()).into_owned(),
        }
        .into_response(),
        _ => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(environment: Environment) -> CorsPolicy {
        CorsPolicy::new(
            &CorsConfig {
                allowed_origins: vec!["https://app.example.com".to_string()],
                allow_credentials: false,
            },
            environment,
        )
    }

    #[test]
    fn test_absent_origin_is_allowed() {
        assert_eq!(policy(Environment::Production).evaluate(None), CorsDecision::Allow);
    }

    #[test]
    fn test_exact_match_is_allowed() {
        let policy = policy(Environment::Production);
        assert_eq!(policy.evaluate(Some("https://app.example.com")), CorsDecision::Allow);
        assert_eq!(policy.evaluate(Some("https://app.example.com/")), CorsDecision::Deny);
        assert_eq!(policy.evaluate(Some("https://evil.example.com")), CorsDecision::Deny);
    }

    #[test]
    fn test_loopback_only_in_development() {
        let relaxed = policy(Environment::Development);
        assert_eq!(relaxed.evaluate(Some("http://localhost:5173")), CorsDecision::Allow);
        assert_eq!(relaxed.evaluate(Some("http://127.0.0.1:8080")), CorsDecision::Allow);
        assert_eq!(relaxed.evaluate(Some("http://localhost")), CorsDecision::Deny);
        assert_eq!(relaxed.evaluate(Some("https://localhost:5173")), CorsDecision::Deny);

        let hardened = policy(Environment::Production);
        assert_eq!(hardened.evaluate(Some("http://localhost:5173")), CorsDecision::Deny);

        let test = policy(Environment::Test);
        assert_eq!(test.evaluate(Some("http://127.0.0.1:8080")), CorsDecision::Deny);
    }

    #[test]
    fn test_non_utf8_origin_is_denied() {
        let origin = HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap_or(HeaderValue::from_static("x"));
        assert!(!policy(Environment::Development).allows(&origin));
    }
}
