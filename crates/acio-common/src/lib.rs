//! ACIO Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the ACIO workspace members.
//!
//! # Overview
//!
//! - **Logging**: process-wide `tracing` subscriber with console output and
//!   severity-routed, rotating log files
//!
//! # Example
//!
//! ```no_run
//! use acio_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod logging;

pub use logging::{init_logging, LogConfig, LoggingGuard, ACCESS_LOG_TARGET};
