//! Correlation ids
//!
//! Each request gets a fresh UUID v4. It is stored as [`RequestContext`] in
//! the request extensions, recorded on a `request` span wrapping the rest of
//! the pipeline (so every log line emitted while handling the request carries
//! it) and echoed back in `X-Request-ID`. The time spent inside the rest of
//! the pipeline is reported in `X-Response-Time`.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub const RESPONSE_TIME_HEADER: HeaderName = HeaderName::from_static("x-response-time");

/// Per-request data, dropped with the request
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            started_at: Instant::now(),
        }
    }

    /// Milliseconds since the request entered, e.g. `0.412ms`
    pub fn elapsed_header(&self) -> String {
        format!("{:.3}ms", self.started_at.elapsed().as_secs_f64() * 1000.0)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let context = RequestContext::new();
    request.extensions_mut().insert(context);

    let span = tracing::info_span!("request", request_id = %context.request_id);
    let mut response = next.run(request).instrument(span).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&context.request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if let Ok(value) = HeaderValue::from_str(&context.elapsed_header()) {
        headers.insert(RESPONSE_TIME_HEADER, value);
    }
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware::from_fn, routing::get, Extension, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_header_matches_context() {
        let app = Router::new()
            .route(
                "/",
                get(|Extension(context): Extension<RequestContext>| async move {
                    context.request_id.to_string()
                }),
            )
            .layer(from_fn(assign_request_id));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();

        assert_eq!(header.as_bytes(), &body[..]);
        assert_eq!(Uuid::parse_str(&header).unwrap().get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_response_time_covers_the_handler() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(std::time::Duration::from_millis(25)).await;
                    "done"
                }),
            )
            .layer(from_fn(assign_request_id));

        let response = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers()[RESPONSE_TIME_HEADER].to_str().unwrap();
        let millis: f64 = header.strip_suffix("ms").unwrap().parse().unwrap();
        assert!(millis >= 25.0, "{header}");
    }
}
