//! ACIO Server - Main entry point

use std::process::ExitCode;
use std::sync::Arc;

use acio_common::logging::{init_logging, LogConfig};
use tracing::info;

use acio_server::{
    config::Config,
    db::{DbConfig, SqliteDatabase},
    server::{install_panic_hook, Server},
};

#[tokio::main]
async fn main() -> ExitCode {
    // Variables from .env are visible to both the logger and the config
    let _ = dotenvy::dotenv();

    let defaults = LogConfig::builder()
        .filter_directives("acio_server=debug,tower_http=info,sqlx=warn")
        .build();
    let log_config = match LogConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid logging configuration, using defaults: {e}");
            defaults
        },
    };

    let guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    info!("Starting ACIO Server");

    let config = match Config::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };
    info!(
        environment = %config.server.environment,
        "Configuration loaded - server will bind to {}",
        config.server.bind_address()
    );

    let database = Arc::new(SqliteDatabase::new(DbConfig::from(&config.database)));
    let server = match Server::start(config, database).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start server");
            return ExitCode::FAILURE;
        },
    };

    install_panic_hook(server.shutdown_handle());

    let status = server.run().await;
    info!(code = status.code(), "Server stopped");

    // A teardown cut off by the deadline can leave tasks the runtime would
    // otherwise wait on, so exit directly once the logs are flushed
    drop(guard);
    std::process::exit(status.code())
}
