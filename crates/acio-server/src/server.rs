//! HTTP server lifecycle
//!
//! [`Server::start`] assembles the app and binds the listener.
//! [`Server::run`] serves until the first shutdown trigger (signal, panic or
//! supervised task failure) and then tears down under a deadline:
//!
//! 1. stop accepting connections and wait for the listener to close
//! 2. close the database
//!
//! Triggers after the first are ignored.

use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::app::App;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ServerError, ServerResult};
use crate::lifecycle::{Lifecycle, LifecycleState, ShutdownReason};

/// Process exit status produced by [`Server::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// Cloneable trigger for graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ShutdownReason>,
    lifecycle: Arc<Lifecycle>,
}

impl ShutdownHandle {
    /// Request shutdown. Only the first trigger is acted on.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        if !self.lifecycle.begin_shutdown() {
            tracing::debug!(%reason, "Shutdown already in progress, ignoring trigger");
            return false;
        }

        if reason.is_failure() {
            tracing::error!(
                %reason,
                detail = reason.detail().unwrap_or_default(),
                "Shutting down after an unrecoverable failure"
            );
        } else {
            tracing::info!(%reason, "Received shutdown signal, starting graceful shutdown");
        }

        // The receiver only goes away once teardown has finished
        let _ = self.tx.send(reason);
        true
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Spawn a background task whose error shuts the server down
    pub fn spawn_supervised<F, E>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                handle.trigger(ShutdownReason::UnhandledTaskFailure(e.to_string()));
            }
        })
    }
}

/// Turn panics anywhere in the process into a shutdown trigger.
///
/// The previously installed hook still runs first.
pub fn install_panic_hook(handle: ShutdownHandle) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);

        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let detail = match info.location() {
            Some(location) => format!("{payload} at {location}"),
            None => payload,
        };

        handle.trigger(ShutdownReason::UncaughtPanic(detail));
    }));
}

async fn listen_for_signals(handle: ShutdownHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => ShutdownReason::Sigint,
        _ = terminate => ShutdownReason::Sigterm,
    };
    handle.trigger(reason);
}

pub struct Server {
    app: Arc<App>,
    listener: TcpListener,
    local_addr: SocketAddr,
    lifecycle: Arc<Lifecycle>,
    shutdown_tx: mpsc::UnboundedSender<ShutdownReason>,
    shutdown_rx: mpsc::UnboundedReceiver<ShutdownReason>,
    shutdown_timeout: Duration,
}

impl Server {
    /// Assemble the app and bind `host:port`
    pub async fn start(config: Arc<Config>, database: Arc<dyn Database>) -> ServerResult<Self> {
        let lifecycle = Arc::new(Lifecycle::new());
        let app = App::initialize(Arc::clone(&config), database).await?;

        let address = config.server.bind_address();
        let bound = match TcpListener::bind(&address).await {
            Ok(listener) => listener.local_addr().map(|local_addr| (listener, local_addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                let error = ServerError::from_bind(&address, e);
                tracing::error!(error = %error, "Failed to start server");
                app.close().await;
                return Err(error);
            },
        };

        lifecycle.mark_listening();
        let environment = config.server.environment;
        tracing::info!(%local_addr, %environment, "Server running on port {}", local_addr.port());
        tracing::info!("Health check available at http://{}/health", local_addr);
        if config.development.enable_swagger && environment.is_relaxed() {
            tracing::info!(
                "API documentation available at http://{}{}",
                local_addr,
                config.development.api_docs_path
            );
        }

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        Ok(Self {
            app: Arc::new(app),
            listener,
            local_addr,
            lifecycle,
            shutdown_tx,
            shutdown_rx,
            shutdown_timeout: config.server.shutdown_timeout(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }

    /// Serve until shutdown, then tear down within the configured deadline
    pub async fn run(self) -> ExitStatus {
        let Server {
            app,
            listener,
            lifecycle,
            shutdown_tx,
            mut shutdown_rx,
            shutdown_timeout,
            ..
        } = self;

        let signals = tokio::spawn(listen_for_signals(ShutdownHandle {
            tx: shutdown_tx,
            lifecycle: Arc::clone(&lifecycle),
        }));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let service = app
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut serving = tokio::spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let reason = tokio::select! {
            reason = shutdown_rx.recv() => reason,
            result = &mut serving => {
                match result {
                    Ok(Ok(())) => tracing::error!("HTTP listener stopped unexpectedly"),
                    Ok(Err(e)) => tracing::error!(error = %e, "HTTP listener failed"),
                    Err(e) => tracing::error!(error = %e, "HTTP listener task failed"),
                }
                signals.abort();
                lifecycle.mark_stopped();
                return ExitStatus::Failure;
            }
        };
        signals.abort();
        tracing::debug!(reason = ?reason, "Shutdown trigger received");

        let teardown = async {
            let _ = stop_tx.send(());
            match serving.await {
                Ok(Ok(())) => tracing::info!("HTTP server closed"),
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Error during server close");
                    return ExitStatus::Failure;
                },
                Err(e) => {
                    tracing::error!(error = %e, "HTTP server task failed during close");
                    return ExitStatus::Failure;
                },
            }

            app.close().await;
            tracing::info!("Graceful shutdown completed");
            ExitStatus::Success
        };

        let status = match tokio::time::timeout(shutdown_timeout, teardown).await {
            Ok(status) => status,
            Err(_) => {
                tracing::error!(
                    timeout_ms = shutdown_timeout.as_millis() as u64,
                    "Forced shutdown after timeout"
                );
                ExitStatus::Failure
            },
        };

        lifecycle.mark_stopped();
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ShutdownHandle, mpsc::UnboundedReceiver<ShutdownReason>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let lifecycle = Arc::new(Lifecycle::new());
        lifecycle.mark_listening();
        (ShutdownHandle { tx, lifecycle }, rx)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure.code(), 1);
    }

    #[test]
    fn test_only_first_trigger_is_delivered() {
        let (handle, mut rx) = handle();
        assert!(handle.trigger(ShutdownReason::Sigterm));
        assert!(!handle.trigger(ShutdownReason::Sigint));

        assert_eq!(rx.try_recv().ok(), Some(ShutdownReason::Sigterm));
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.state(), LifecycleState::ShuttingDown);
    }

    #[tokio::test]
    async fn test_supervised_failure_triggers_shutdown() {
        let (handle, mut rx) = handle();
        let task = handle.spawn_supervised(async { Err::<(), _>("queue consumer crashed") });
        let _ = task.await;

        assert_eq!(
            rx.recv().await,
            Some(ShutdownReason::UnhandledTaskFailure("queue consumer crashed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_supervised_success_is_silent() {
        let (handle, mut rx) = handle();
        let task = handle.spawn_supervised(async { Ok::<(), String>(()) });
        let _ = task.await;

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.state(), LifecycleState::Listening);
    }
}
