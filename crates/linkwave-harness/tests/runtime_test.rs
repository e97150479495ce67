//! The production runtime driven by the scripted driver on virtual time.
//!
//! `Runtime<SimDriver, SimEnv>` runs as an ordinary tokio task. The test
//! plays the socket through `SimRemote` and moves the clock with
//! `SimEnv::advance`, so reconnect timing is exact and nothing sleeps.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use linkwave_client::{ChatHandle, ConnectionState, ManagerConfig, ReconnectPolicy, Runtime};
use linkwave_harness::{DriverCall, SimDriver, SimEnv, SimRemote};
use linkwave_proto::EventKind;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

fn config() -> ManagerConfig {
    ManagerConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_attempts: 3,
            max_delay: None,
        },
        ..ManagerConfig::json("ws://gateway/ws")
    }
}

fn start() -> (ChatHandle, SimRemote, SimEnv, JoinHandle<()>) {
    let (driver, remote) = SimDriver::new();
    let env = SimEnv::with_seed(11);
    let (runtime, handle) = Runtime::new(driver, env.clone(), config()).unwrap();
    let task = tokio::spawn(runtime.run());
    (handle, remote, env, task)
}

/// Yield to the runtime task until `condition` holds.
async fn settle(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("runtime never reached the expected state");
}

#[tokio::test]
async fn connect_flush_and_reconnect_on_virtual_time() {
    let (handle, remote, env, task) = start();

    handle.send_chat("u2", "queued").await.unwrap();
    handle.connect().unwrap();
    settle(|| remote.last_open() == Some(1)).await;

    remote.opened(1);
    handle.wait_for(ConnectionState::Connected).await.unwrap();
    settle(|| !remote.transmitted().is_empty()).await;
    let transmitted = remote.transmitted();
    assert_eq!(transmitted.len(), 1);
    let frame: Value = serde_json::from_str(&transmitted[0]).unwrap();
    assert_eq!(frame, json!({ "type": "chat.send", "payload": { "to": "u2", "body": "queued" } }));

    remote.closed(1, "connection reset");
    handle.wait_for(ConnectionState::Reconnecting).await.unwrap();

    env.advance(Duration::from_millis(999));
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.open_count(), 1);

    env.advance(Duration::from_millis(1));
    settle(|| remote.open_count() == 2).await;
    assert_eq!(remote.last_open(), Some(2));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn stale_events_are_ignored() {
    let (handle, remote, _env, task) = start();
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);
    handle
        .on(EventKind::ConnectionOpened, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    handle.connect().unwrap();
    settle(|| remote.last_open() == Some(1)).await;
    handle.disconnect().unwrap();
    handle.wait_for(ConnectionState::Disconnected).await.unwrap();
    settle(|| remote.calls().contains(&DriverCall::Close { generation: 1 })).await;

    // The abandoned socket finishes opening after all.
    remote.opened(1);
    remote.text(1, r#"{"type":"typing.start","payload":{"from":"u2"}}"#);
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    assert_eq!(handle.status(), ConnectionState::Disconnected);
    assert_eq!(opened.load(Ordering::SeqCst), 0);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn failed_opens_exhaust_budget() {
    let (handle, remote, env, task) = start();

    handle.connect().unwrap();
    settle(|| remote.last_open() == Some(1)).await;
    remote.opened(1);
    handle.wait_for(ConnectionState::Connected).await.unwrap();
    remote.closed(1, "connection reset");
    handle.wait_for(ConnectionState::Reconnecting).await.unwrap();

    for (generation, delay_ms) in [(2, 1000), (3, 2000), (4, 4000)] {
        env.advance(Duration::from_millis(delay_ms));
        settle(|| remote.last_open() == Some(generation)).await;
        remote.failed(generation, "connection refused");
        settle(|| handle.status() != ConnectionState::Connecting).await;
    }

    handle.wait_for(ConnectionState::Disconnected).await.unwrap();
    env.advance(Duration::from_secs(3600));
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(remote.open_count(), 4);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn dropping_every_handle_stops_the_runtime() {
    let (handle, remote, _env, task) = start();
    handle.connect().unwrap();
    settle(|| remote.last_open() == Some(1)).await;
    remote.opened(1);
    handle.wait_for(ConnectionState::Connected).await.unwrap();

    drop(handle);
    task.await.unwrap();
    assert!(remote.calls().contains(&DriverCall::Close { generation: 1 }));
}
