//! HTTP access log
//!
//! One line per request on the access target. Production writes the Apache
//! combined format and leaves health probes out; other modes use a short
//! development line.

use acio_common::logging::ACCESS_LOG_TARGET;
use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri, Version},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use super::client_ip;
use crate::config::Environment;

/// Request attributes captured before the request moves down the pipeline
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub remote: IpAddr,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

impl AccessRecord {
    pub fn capture(request: &Request) -> Self {
        let header_text = |name| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };

        Self {
            remote: client_ip(request),
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            referrer: header_text(header::REFERER),
            user_agent: header_text(header::USER_AGENT),
        }
    }

    /// `:remote-addr - - [:date] ":method :url HTTP/:version" :status :length ":referrer" ":user-agent"`
    pub fn combined(
        &self,
        status: StatusCode,
        length: Option<u64>,
        at: DateTime<Utc>,
    ) -> String {
        format!(
            "{} - - [{}] \"{} {} {:?}\" {} {} \"{}\" \"{}\"",
            self.remote,
            at.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.version,
            status.as_u16(),
            dash_or(length),
            self.referrer.as_deref().unwrap_or("-"),
            self.user_agent.as_deref().unwrap_or("-"),
        )
    }

    /// `:method :url :status :length - :response-time ms`
    pub fn development(&self, status: StatusCode, length: Option<u64>, elapsed: Duration) -> String {
        format!(
            "{} {} {} {} - {:.3} ms",
            self.method,
            self.uri,
            status.as_u16(),
            dash_or(length),
            elapsed.as_secs_f64() * 1000.0
        )
    }
}

fn dash_or(length: Option<u64>) -> String {
    length.map_or_else(|| "-".to_string(), |length| length.to_string())
}

fn response_length(headers: &HeaderMap, body_hint: Option<u64>) -> Option<u64> {
    body_hint.or_else(|| {
        headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    })
}

/// Whether the line for `path` is dropped in this environment
pub fn is_skipped(environment: Environment, path: &str) -> bool {
    environment.is_hardened() && path.starts_with("/health")
}

pub async fn access_log(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    if is_skipped(environment, request.uri().path()) {
        return next.run(request).await;
    }

    let record = AccessRecord::capture(&request);
    let started = Instant::now();
    let response = next.run(request).await;

    let length = response_length(response.headers(), response.body().size_hint().exact());
    let line = if environment.is_hardened() {
        record.combined(response.status(), length, Utc::now())
    } else {
        record.development(response.status(), length, started.elapsed())
    };

    tracing::info!(target: ACCESS_LOG_TARGET, "{}", line);
    response
}
