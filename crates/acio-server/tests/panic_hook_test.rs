//! The panic hook is process-wide, so this lives in its own test binary.

use std::sync::Arc;
use std::time::Duration;

use acio_server::{
    config::Environment,
    server::{install_panic_hook, Server},
    ExitStatus, LifecycleState,
};

mod common;
use common::{test_config, FakeDatabase};

#[tokio::test]
async fn test_panic_in_task_triggers_graceful_shutdown() {
    let database = FakeDatabase::healthy();
    let server = Server::start(
        Arc::new(test_config(Environment::Development)),
        database.clone(),
    )
    .await
    .unwrap();
    let handle = server.shutdown_handle();
    install_panic_hook(handle.clone());

    let running = tokio::spawn(server.run());

    let crashed = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        panic!("worker exploded");
    });
    assert!(crashed.await.is_err());

    let status = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, ExitStatus::Success);
    assert_eq!(handle.state(), LifecycleState::Stopped);
    assert_eq!(database.events().last(), Some(&"close"));
}
