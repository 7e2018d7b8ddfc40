//! Application assembly
//!
//! [`App::initialize`] connects the database, then stacks the middleware
//! pipeline around the route table. Layers wrap inside-out, so they are
//! added innermost first.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use std::sync::Arc;

use crate::api::{self, AppState};
use crate::config::Config;
use crate::db::Database;
use crate::error::{ServerError, ServerResult};
use crate::middleware::{
    access_log::access_log,
    compression_layer,
    cors::{enforce_cors, CorsPolicy},
    cors_layer,
    errors::render_errors,
    payload::{parse_body, reject_invalid_payload},
    rate_limit::{rate_limit, ClientRateLimiter, RateLimitProfile},
    request_id::assign_request_id,
    sanitize::sanitize_input,
    security::security_headers,
    timing_layer,
};

pub struct App {
    database: Arc<dyn Database>,
    router: Router,
}

impl App {
    /// Connect the database (one attempt) and build the pipeline
    pub async fn initialize(config: Arc<Config>, database: Arc<dyn Database>) -> ServerResult<Self> {
        tracing::info!("Initializing database connection...");
        database.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize database");
            ServerError::Database(e)
        })?;
        tracing::info!("Database initialized successfully");

        let router = build_router(config, Arc::clone(&database));
        tracing::info!("Middleware, routes and error handling initialized successfully");

        Ok(Self { database, router })
    }

    /// The assembled pipeline, cheap to clone
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Release the database. Failures are logged, never returned.
    pub async fn close(&self) {
        match self.database.close().await {
            Ok(()) => tracing::info!("Database connection closed"),
            Err(e) => tracing::error!(error = %e, "Error closing database connection"),
        }
    }
}

fn build_router(config: Arc<Config>, database: Arc<dyn Database>) -> Router {
    let environment = config.server.environment;
    let state = AppState::new(Arc::clone(&config), database);
    let cors_policy = Arc::new(CorsPolicy::new(&config.cors, environment));

    let router = api::routes(state)
        .layer(from_fn(reject_invalid_payload))
        .layer(timing_layer());

    let router = if environment.is_hardened() {
        let limiter = Arc::new(ClientRateLimiter::new(RateLimitProfile::general(&config.security)));
        router.layer(from_fn_with_state(limiter, rate_limit))
    } else {
        router
    };

    router
        .layer(from_fn(sanitize_input))
        .layer(from_fn_with_state(config.security.max_body_bytes, parse_body))
        .layer(from_fn(assign_request_id))
        .layer(from_fn_with_state(environment, access_log))
        .layer(compression_layer(environment))
        .layer(cors_layer(&config.cors, Arc::clone(&cors_policy)))
        .layer(from_fn_with_state(cors_policy, enforce_cors))
        .layer(from_fn(security_headers))
        .layer(from_fn_with_state(environment, render_errors))
}
