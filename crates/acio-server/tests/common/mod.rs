//! Common test utilities for ACIO server integration tests
//!
//! [`FakeDatabase`] stands in for SQLite so tests can script connection,
//! probe and close failures, and observe whether the listener was still
//! accepting when the database was closed. [`test_config`] builds a configuration bound to
//! an ephemeral loopback port.

#![allow(dead_code)]

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acio_server::config::{Config, Environment};
use acio_server::db::{Database, DbError, DbResult};

/// Production needs a secret of at least 32 characters
pub const STRONG_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Scriptable [`Database`]
#[derive(Debug, Default)]
pub struct FakeDatabase {
    pub fail_init: bool,
    pub fail_ping: bool,
    pub fail_close: bool,
    /// `close` never completes
    pub hang_close: bool,
    open: AtomicBool,
    pings: AtomicUsize,
    events: Mutex<Vec<&'static str>>,
    listener: Mutex<Option<SocketAddr>>,
}

impl FakeDatabase {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(configure: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut database = Self::default();
        configure(&mut database);
        Arc::new(database)
    }

    /// On `close`, try to connect to `addr` and record whether it still accepts
    pub fn watch_listener(&self, addr: SocketAddr) {
        if let Ok(mut listener) = self.listener.lock() {
            *listener = Some(addr);
        }
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Calls in order: `initialize`, `ping`, `listener_open` or
    /// `listener_closed` (when watching), `close`
    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    fn record(&self, event: &'static str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn initialize(&self) -> DbResult<()> {
        self.record("initialize");
        if self.fail_init {
            return Err(DbError::Config("connection refused".to_string()));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> DbResult<()> {
        self.record("ping");
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.fail_ping {
            return Err(DbError::Config("database unreachable".to_string()));
        }
        if !self.is_open() {
            return Err(DbError::NotInitialized);
        }
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let watched = self.listener.lock().ok().and_then(|listener| *listener);
        if let Some(addr) = watched {
            match tokio::net::TcpStream::connect(addr).await {
                Ok(_) => self.record("listener_open"),
                Err(_) => self.record("listener_closed"),
            }
        }
        self.record("close");
        if self.hang_close {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.open.store(false, Ordering::SeqCst);
        if self.fail_close {
            return Err(DbError::Config("close failed".to_string()));
        }
        Ok(())
    }
}

/// Configuration on `127.0.0.1:0` for `environment`
pub fn test_config(environment: Environment) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.environment = environment;
    config.server.shutdown_timeout_ms = 2_000;
    config.cors.allowed_origins = vec!["https://app.example.com".to_string()];
    if environment.is_hardened() {
        config.jwt.secret = Some(STRONG_JWT_SECRET.to_string());
    }
    config
}
