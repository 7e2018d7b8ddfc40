//! ACIO Server Library
//!
//! HTTP backend scaffold for the IB ACIO Preparation System.
//!
//! # Overview
//!
//! - **Health probes**: liveness, readiness, basic and detailed status
//! - **Database**: SQLite pool behind the [`db::Database`] trait
//! - **Configuration**: environment-based, validated at startup
//! - **Middleware**: security headers, CORS, compression, access logging,
//!   correlation ids, body parsing, input sanitising, rate limiting
//! - **Lifecycle**: signal, panic and task-failure triggered graceful
//!   shutdown under a deadline
//!
//! # Request pipeline
//!
//! Every request passes the stages in [`middleware`] in a fixed order.
//! Failures anywhere are carried out as an [`error::ErrorReport`] and
//! rendered by the error chain into
//! `{"success": false, "error": {"code", "message", "details"?}}`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use acio_server::{config::Config, db::{DbConfig, SqliteDatabase}, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::load()?);
//!     let database = Arc::new(SqliteDatabase::new(DbConfig::from(&config.database)));
//!     let server = Server::start(config, database).await?;
//!     std::process::exit(server.run().await.code());
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod server;

// Re-export commonly used types
pub use app::App;
pub use error::{AppError, ServerError, ServerResult};
pub use lifecycle::{Lifecycle, LifecycleState, ShutdownReason};
pub use server::{ExitStatus, Server, ShutdownHandle};
