//! HTTP routes
//!
//! Health probes are mounted at the root; everything versioned lives under
//! [`API_PREFIX`].

pub mod health;
pub mod response;

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::Database;
use crate::error::AppError;

pub const API_PREFIX: &str = "/api/v1";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: Arc<dyn Database>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, database: Arc<dyn Database>) -> Self {
        Self {
            config,
            database,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

/// Build the route table, including the not-found fallback.
///
/// An unsupported method on a known path is answered like an unknown path,
/// so every method router carries the same fallback.
pub fn routes(state: AppState) -> Router {
    // Domain routers (auth, questions, exams, analytics) nest under API_PREFIX
    Router::new()
        .merge(health::routes())
        .route("/", get(root).fallback(route_not_found))
        .route(API_PREFIX, get(api_directory).fallback(route_not_found))
        .fallback(route_not_found)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RootEndpoints {
    health: &'static str,
    health_detailed: &'static str,
    ready: &'static str,
    live: &'static str,
    api: &'static str,
}

#[derive(Debug, Serialize)]
struct RootInfo {
    success: bool,
    message: &'static str,
    version: &'static str,
    environment: &'static str,
    timestamp: String,
    endpoints: RootEndpoints,
}

async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(RootInfo {
        success: true,
        message: "IB ACIO Preparation System API",
        version: health::VERSION,
        environment: state.config.server.environment.as_str(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        endpoints: RootEndpoints {
            health: "/health",
            health_detailed: "/health/detailed",
            ready: "/health/ready",
            live: "/health/live",
            api: API_PREFIX,
        },
    })
}

#[derive(Debug, Serialize)]
struct ApiEndpoints {
    auth: String,
    questions: String,
    exams: String,
    analytics: String,
}

#[derive(Debug, Serialize)]
struct ApiDirectory {
    success: bool,
    message: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    documentation: Option<String>,
    endpoints: ApiEndpoints,
}

/// `{scheme}://{host}{docs_path}`; the scheme honours one proxy hop
fn documentation_url(uri: &Uri, headers: &HeaderMap, docs_path: &str) -> Option<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))?;

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");

    Some(format!("{scheme}://{host}{docs_path}"))
}

async fn api_directory(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> impl IntoResponse {
    let development = &state.config.development;
    let documentation = development
        .enable_swagger
        .then(|| documentation_url(&uri, &headers, &development.api_docs_path))
        .flatten();

    Json(ApiDirectory {
        success: true,
        message: "IB ACIO Preparation System API v1",
        version: health::VERSION,
        documentation,
        endpoints: ApiEndpoints {
            auth: format!("{API_PREFIX}/auth"),
            questions: format!("{API_PREFIX}/questions"),
            exams: format!("{API_PREFIX}/exams"),
            analytics: format!("{API_PREFIX}/analytics"),
        },
    })
}

pub(crate) async fn route_not_found(method: Method, uri: Uri) -> AppError {
    AppError::RouteNotFound {
        method: method.to_string(),
        path: uri.path().to_string(),
    }
}
