//! Middleware for the ACIO server
//!
//! Stages in pipeline order (outermost first):
//! - Error chain ([`errors`])
//! - Security headers ([`security`])
//! - CORS policy ([`cors`] plus [`cors_layer`])
//! - Response compression ([`compression_layer`])
//! - Access log ([`access_log`])
//! - Correlation ids ([`request_id`])
//! - Body and query parsing ([`payload`])
//! - Input sanitising ([`sanitize`])
//! - Rate limiting ([`rate_limit`], production only)
//! - Response timing ([`timing_layer`])
//! - Payload guard ([`payload::reject_invalid_payload`])

use acio_common::logging::ACCESS_LOG_TARGET;
use axum::{
    extract::ConnectInfo,
    http::{header, HeaderName, Method, Request, Response},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    compression::{
        predicate::{DefaultPredicate, Predicate, SizeAbove},
        CompressionLayer, CompressionLevel,
    },
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::config::{CorsConfig, Environment};

pub mod access_log;
pub mod cors;
pub mod errors;
pub mod payload;
pub mod rate_limit;
pub mod request_id;
pub mod sanitize;
pub mod security;

use self::cors::CorsPolicy;
use self::request_id::{RequestContext, REQUEST_ID_HEADER, RESPONSE_TIME_HEADER};

/// Responses smaller than this are sent uncompressed
pub const COMPRESSION_THRESHOLD_BYTES: u16 = 1024;

/// Client address for rate limiting and logging.
///
/// One proxy hop is trusted: the right-most `X-Forwarded-For` entry wins,
/// then the socket peer, then `0.0.0.0` when neither is known.
pub fn client_ip<B>(request: &Request<B>) -> IpAddr {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok());

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Create CORS layer from configuration
///
/// Origins are re-checked against `policy`, so only allowed origins are
/// echoed back in `Access-Control-Allow-Origin`.
pub fn cors_layer(config: &CorsConfig, policy: Arc<CorsPolicy>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin, _| policy.allows(origin)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-api-key"),
        ])
        .expose_headers([
            HeaderName::from_static("x-total-count"),
            RESPONSE_TIME_HEADER,
            REQUEST_ID_HEADER,
        ])
        .max_age(Duration::from_secs(86_400));

    // Configure credentials
    if config.allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

pub type CompressionPredicate = tower_http::compression::predicate::And<DefaultPredicate, SizeAbove>;

/// Compress bodies above [`COMPRESSION_THRESHOLD_BYTES`]; production trades
/// CPU for ratio
pub fn compression_layer(environment: Environment) -> CompressionLayer<CompressionPredicate> {
    let level = if environment.is_hardened() { 6 } else { 1 };
    CompressionLayer::new()
        .quality(CompressionLevel::Precise(level))
        .compress_when(DefaultPredicate::new().and(SizeAbove::new(COMPRESSION_THRESHOLD_BYTES)))
}

/// Span for the timing recorder, tagged with the correlation id
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map(|context| context.request_id.to_string())
            .unwrap_or_default();
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");

        tracing::info_span!(
            "http",
            method = %request.method(),
            uri = %request.uri(),
            client = %client_ip(request),
            user_agent,
            request_id = %request_id,
        )
    }
}

/// Logs status and elapsed milliseconds when the response is produced
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            status = response.status().as_u16(),
            response_time_ms = latency.as_secs_f64() * 1000.0,
            "Request completed"
        );
    }
}

pub type TimingLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan, DefaultOnRequest, RecordResponse>;

/// Create the response timing layer
pub fn timing_layer() -> TimingLayer {
    TraceLayer::new_for_http()
        .make_span_with(RequestSpan)
        .on_response(RecordResponse)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(forwarded: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        if let Some(forwarded) = forwarded {
            builder = builder.header("x-forwarded-for", forwarded);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_client_ip_trusts_one_proxy_hop() {
        let ip = client_ip(&request(Some("198.51.100.7, 10.0.0.2")));
        assert_eq!(ip, "10.0.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_prefers_socket_peer_over_garbage() {
        let mut request = request(Some("not-an-ip"));
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.1:4000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&request), "192.0.2.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_fallback() {
        assert_eq!(client_ip(&request(None)), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_cors_layer_with_credentials() {
        let config = CorsConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            allow_credentials: true,
        };
        let policy = Arc::new(CorsPolicy::new(&config, Environment::Production));
        let _layer = cors_layer(&config, policy);
        // Layer is created successfully
    }
}
