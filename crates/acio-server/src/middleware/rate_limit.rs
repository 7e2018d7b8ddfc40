//! Rate limiting middleware using governor

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter,
};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SecurityConfig;
use crate::error::AppError;

use super::client_ip;

/// Tracked clients above which idle limiter state is pruned
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

const RATE_LIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");

/// Window, ceiling and rejection payload of one limiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitProfile {
    pub window: Duration,
    pub max_requests: u32,
    pub code: &'static str,
    pub message: &'static str,
}

impl RateLimitProfile {
    /// Pipeline-wide limiter, installed in production only
    pub fn general(config: &SecurityConfig) -> Self {
        Self {
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_max_requests,
            code: "RATE_LIMIT_EXCEEDED",
            message: "Too many requests from this IP, please try again later.",
        }
    }

    /// Stricter limiter for authentication endpoints
    pub fn auth() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_requests: 5,
            code: "AUTH_RATE_LIMIT_EXCEEDED",
            message: "Too many authentication attempts, please try again later.",
        }
    }

    /// Limiter for endpoints that call external services
    pub fn api() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
            code: "RATE_LIMIT_EXCEEDED",
            message: "Too many requests from this IP, please try again later.",
        }
    }

    /// `RateLimit-Policy` value, e.g. `100;w=900`
    pub fn policy(&self) -> String {
        format!("{};w={}", self.max_requests, self.window.as_secs())
    }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.max_requests).unwrap_or(NonZeroU32::MIN);
        let period = self.window / burst.get();
        Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst)
    }
}

/// Per-client limiter for one profile
pub struct ClientRateLimiter {
    profile: RateLimitProfile,
    policy: HeaderValue,
    limiter: DefaultKeyedRateLimiter<IpAddr>,
    clock: DefaultClock,
}

impl ClientRateLimiter {
    pub fn new(profile: RateLimitProfile) -> Self {
        let policy = HeaderValue::from_str(&profile.policy())
            .unwrap_or_else(|_| HeaderValue::from_static("0"));
        Self {
            limiter: RateLimiter::keyed(profile.quota()),
            clock: DefaultClock::default(),
            policy,
            profile,
        }
    }

    pub fn profile(&self) -> &RateLimitProfile {
        &self.profile
    }

    /// Charge one request to `client`. On rejection returns how long the
    /// client has to wait.
    pub fn check(&self, client: IpAddr) -> Result<(), Duration> {
        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }

        self.limiter
            .check_key(&client)
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    fn rejection(&self, wait: Duration) -> AppError {
        AppError::RateLimited {
            code: self.profile.code,
            message: self.profile.message,
            retry_after_secs: wait.as_secs().max(1),
        }
    }
}

/// Reject clients over their quota; downstream stages are never reached
pub async fn rate_limit(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request);

    let mut response = match limiter.check(client) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            tracing::warn!(%client, code = limiter.profile.code, "Rate limit exceeded");
            limiter.rejection(wait).into_response()
        },
    };

    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_POLICY, limiter.policy.clone());
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limiter.profile.max_requests));
    response
}
