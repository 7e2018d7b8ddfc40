//! Database collaborator
//!
//! The server only needs a handful of operations from its storage layer:
//! open it once at startup, probe it from the health endpoints and release it
//! during shutdown. [`Database`] captures exactly that so the application and
//! its tests can swap in other implementations.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Database operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// Creating the database directory failed
    #[error("Database file system error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection has not been opened yet or was already closed
    #[error("Database is not initialized")]
    NotInitialized,
}

pub type DbResult<T> = Result<T, DbError>;

/// Storage collaborator used by the application and the health endpoints.
#[async_trait]
pub trait Database: Send + Sync {
    /// Open the connection. Called exactly once, before anything is served.
    async fn initialize(&self) -> DbResult<()>;

    /// Whether a connection is currently held.
    fn is_open(&self) -> bool;

    /// One trivial round trip (`SELECT 1 as test`).
    async fn ping(&self) -> DbResult<()>;

    /// Release the connection. Closing twice is not an error.
    async fn close(&self) -> DbResult<()>;
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl From<&DatabaseConfig> for DbConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }
}

/// [`Database`] backed by an SQLite connection pool.
pub struct SqliteDatabase {
    config: DbConfig,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteDatabase {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    fn current(&self) -> Option<SqlitePool> {
        self.pool
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn replace(&self, pool: Option<SqlitePool>) -> Option<SqlitePool> {
        let mut slot = self
            .pool
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, pool)
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn initialize(&self) -> DbResult<()> {
        if self.is_open() {
            return Ok(());
        }

        if !self.config.url.starts_with("sqlite:") {
            return Err(DbError::Config(format!(
                "unsupported database URL scheme in '{}'",
                self.config.url
            )));
        }

        let options = SqliteConnectOptions::from_str(&self.config.url)
            .map_err(|e| DbError::Config(e.to_string()))?
            .create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1 as test").execute(&pool).await?;

        tracing::info!(
            max_connections = self.config.max_connections,
            "Database connection pool created"
        );

        self.replace(Some(pool));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.current().is_some_and(|pool| !pool.is_closed())
    }

    async fn ping(&self) -> DbResult<()> {
        let pool = self.current().ok_or(DbError::NotInitialized)?;
        sqlx::query_scalar::<_, i64>("SELECT 1 as test")
            .fetch_one(&pool)
            .await?;
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        if let Some(pool) = self.replace(None) {
            pool.close().await;
            tracing::debug!("SQLite pool closed");
        }
        Ok(())
    }
}
