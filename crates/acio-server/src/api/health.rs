//! Health probes
//!
//! Four probes of increasing depth, all built on [`StatusSnapshot`]:
//!
//! | Route              | Snapshot          | Checks                         |
//! |--------------------|-------------------|--------------------------------|
//! | `/health/live`     | [`Liveness`]      | none                           |
//! | `/health`          | [`BasicHealth`]   | none                           |
//! | `/health/detailed` | [`DetailedHealth`]| database, API credentials      |
//! | `/health/ready`    | [`Readiness`]     | database                       |
//!
//! Probes are mounted without the API prefix so orchestrators can reach them
//! at fixed paths.

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::{route_not_found, AppState};
use crate::config::ExternalApiConfig;

/// Package version reported by the probes
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A point-in-time report that decides its own HTTP status
#[async_trait]
pub trait StatusSnapshot: Serialize + Send + Sized + 'static {
    /// Gather the snapshot. Dependency failures are folded into the report.
    async fn collect(state: &AppState) -> Self;

    fn is_healthy(&self) -> bool;

    fn status_code(&self) -> StatusCode {
        if self.is_healthy() {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Serve one snapshot type
pub async fn probe<S: StatusSnapshot>(State(state): State<AppState>) -> Response {
    let snapshot = S::collect(&state).await;
    (snapshot.status_code(), Json(snapshot)).into_response()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(probe::<BasicHealth>).fallback(route_not_found))
        .route("/health/detailed", get(probe::<DetailedHealth>).fallback(route_not_found))
        .route("/health/ready", get(probe::<Readiness>).fallback(route_not_found))
        .route("/health/live", get(probe::<Liveness>).fallback(route_not_found))
}

// ============================================================================
// Liveness
// ============================================================================

/// `GET /health/live`: the process can still execute code
#[derive(Debug, Serialize)]
pub struct Liveness {
    pub success: bool,
    pub alive: bool,
    pub timestamp: String,
}

#[async_trait]
impl StatusSnapshot for Liveness {
    async fn collect(_state: &AppState) -> Self {
        Self {
            success: true,
            alive: true,
            timestamp: timestamp(),
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// Basic health
// ============================================================================

/// `GET /health`
#[derive(Debug, Serialize)]
pub struct BasicHealth {
    pub success: bool,
    pub data: BasicHealthData,
}

#[derive(Debug, Serialize)]
pub struct BasicHealthData {
    /// Seconds since the application was assembled
    pub uptime: f64,
    pub message: &'static str,
    pub timestamp: String,
    pub environment: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[async_trait]
impl StatusSnapshot for BasicHealth {
    async fn collect(state: &AppState) -> Self {
        Self {
            success: true,
            data: BasicHealthData {
                uptime: state.uptime_secs(),
                message: "Server is running",
                timestamp: timestamp(),
                environment: state.config.server.environment.as_str(),
                version: VERSION,
                status: "healthy",
            },
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// Detailed health
// ============================================================================

/// `GET /health/detailed`
#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    pub success: bool,
    pub data: DetailedHealthData,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthData {
    /// `healthy` or `degraded`
    pub status: &'static str,
    pub timestamp: String,
    pub environment: &'static str,
    pub version: &'static str,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub server: ServerCheck,
    pub database: DatabaseCheck,
    #[serde(rename = "externalAPIs")]
    pub external_apis: ExternalApiChecks,
}

impl HealthChecks {
    /// Every sub-status, external APIs flattened one per entry
    pub fn statuses(&self) -> [&'static str; 4] {
        [
            self.server.status,
            self.database.status,
            self.external_apis.claude.status,
            self.external_apis.news.status,
        ]
    }

    pub fn all_healthy(&self) -> bool {
        self.statuses()
            .iter()
            .all(|status| matches!(*status, "healthy" | "configured"))
    }
}

#[derive(Debug, Serialize)]
pub struct ServerCheck {
    pub status: &'static str,
    pub uptime: f64,
    pub version: &'static str,
    pub pid: u32,
}

#[derive(Debug, Serialize)]
pub struct DatabaseCheck {
    /// `healthy`, `unhealthy`, or `unknown` when no connection is held
    pub status: &'static str,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExternalApiChecks {
    pub claude: ExternalApiCheck,
    pub news: ExternalApiCheck,
}

#[derive(Debug, Serialize)]
pub struct ExternalApiCheck {
    pub configured: bool,
    pub status: &'static str,
}

impl From<&ExternalApiConfig> for ExternalApiCheck {
    fn from(api: &ExternalApiConfig) -> Self {
        let configured = api.is_configured();
        Self {
            configured,
            status: if configured { "configured" } else { "not_configured" },
        }
    }
}

#[async_trait]
impl StatusSnapshot for DetailedHealth {
    async fn collect(state: &AppState) -> Self {
        let database = if !state.database.is_open() {
            DatabaseCheck {
                status: "unknown",
                connected: false,
                error: None,
            }
        } else {
            match state.database.ping().await {
                Ok(()) => DatabaseCheck {
                    status: "healthy",
                    connected: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Database health check failed");
                    DatabaseCheck {
                        status: "unhealthy",
                        connected: false,
                        error: Some(e.to_string()),
                    }
                },
            }
        };

        let checks = HealthChecks {
            server: ServerCheck {
                status: "healthy",
                uptime: state.uptime_secs(),
                version: VERSION,
                pid: std::process::id(),
            },
            database,
            external_apis: ExternalApiChecks {
                claude: ExternalApiCheck::from(&state.config.apis.claude),
                news: ExternalApiCheck::from(&state.config.apis.news),
            },
        };

        let healthy = checks.all_healthy();
        Self {
            success: healthy,
            data: DetailedHealthData {
                status: if healthy { "healthy" } else { "degraded" },
                timestamp: timestamp(),
                environment: state.config.server.environment.as_str(),
                version: VERSION,
                checks,
            },
        }
    }

    fn is_healthy(&self) -> bool {
        self.success
    }
}

// ============================================================================
// Readiness
// ============================================================================

/// `GET /health/ready`: safe to receive traffic now
#[derive(Debug, Serialize)]
pub struct Readiness {
    pub success: bool,
    pub ready: bool,
    pub checks: Vec<ReadinessCheck>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ReadinessCheck {
    pub service: &'static str,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
impl StatusSnapshot for Readiness {
    async fn collect(state: &AppState) -> Self {
        let database = match state.database.ping().await {
            Ok(()) => ReadinessCheck {
                service: "database",
                ready: true,
                error: None,
            },
            Err(e) => ReadinessCheck {
                service: "database",
                ready: false,
                error: Some(e.to_string()),
            },
        };

        let checks = vec![database];
        let ready = checks.iter().all(|check| check.ready);
        Self {
            success: ready,
            ready,
            checks,
            timestamp: timestamp(),
        }
    }

    fn is_healthy(&self) -> bool {
        self.ready
    }
}
