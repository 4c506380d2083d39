// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection loss, re-dial and token rotation tests.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockConnector, init_tracing, test_config, wait_until};
use serde_json::{Value, json};
use stratum_sdk::{
    ClientConfig, ClientMessage, ConnectionHooks, ConnectionState, FnTokenProvider,
    GraphqlRequest, SdkError, StaticToken, SubscriptionClient, TokenProvider,
};

fn client_with(
    connector: Arc<MockConnector>,
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
    hooks: ConnectionHooks,
) -> SubscriptionClient {
    SubscriptionClient::builder(config)
        .connector(connector)
        .token_provider(tokens)
        .hooks(hooks)
        .build()
        .unwrap()
}

fn request(name: &str) -> GraphqlRequest {
    GraphqlRequest::new(format!("subscription {{ {} }}", name))
}

/// Token provider that hands out `token-A`, `token-B`, ... and can be told
/// to fail its next fetch.
fn rotating_tokens() -> (Arc<dyn TokenProvider>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let issued = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let (i, f) = (issued.clone(), failures.clone());
    let provider = FnTokenProvider::new(move || {
        let fail = f
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let n = i.fetch_add(1, Ordering::SeqCst);
        async move {
            if fail {
                return Err(SdkError::Auth("token service unavailable".to_string()));
            }
            let letter = char::from(b'A' + (n % 26) as u8);
            Ok(format!("token-{}", letter))
        }
    });
    (Arc::new(provider), issued, failures)
}

#[tokio::test]
async fn test_lost_connection_replays_every_subscription() {
    init_tracing();
    let (connector, mut server) = MockConnector::new();
    let disconnects = Arc::new(AtomicUsize::new(0));
    let d = disconnects.clone();
    let client = client_with(
        connector.clone(),
        test_config(),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::new().on_disconnect(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let mut first = client.subscribe::<Value>(&request("a")).unwrap();
    let second = client.subscribe::<Value>(&request("b")).unwrap();

    let mut conn = server.accept().await;
    let ids = conn.subscribed_ids(2).await;
    conn.disconnect();

    let mut conn = server.accept().await;
    assert_eq!(conn.subscribed_ids(2).await, ids);
    conn.assert_silent(Duration::from_millis(50)).await;
    server.assert_no_connection(Duration::from_millis(50)).await;

    assert_eq!(connector.dials(), 2);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    wait_until("running", || client.state() == ConnectionState::Running).await;

    // Events flow again on the new connection.
    conn.next(first.id().as_str(), json!({ "data": { "a": 1 } }));
    assert_eq!(first.recv().await.unwrap().unwrap(), json!({ "a": 1 }));
    assert_eq!(client.active_subscriptions(), 2);
    drop(second);
}

#[tokio::test]
async fn test_no_reconnect_without_subscriptions() {
    let (connector, mut server) = MockConnector::new();
    let client = client_with(
        connector.clone(),
        test_config(),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::default(),
    );

    let sub = client.subscribe::<Value>(&request("a")).unwrap();
    let mut conn = server.accept().await;
    conn.subscribed_ids(1).await;

    sub.unsubscribe().unwrap();
    assert!(matches!(conn.recv().await, ClientMessage::Complete { .. }));
    conn.disconnect();

    wait_until("idle", || client.state() == ConnectionState::Idle).await;
    assert!(!client.is_running());
    server.assert_no_connection(Duration::from_millis(100)).await;
    assert_eq!(connector.dials(), 1);

    // The next subscription starts a fresh connection.
    let _sub = client.subscribe::<Value>(&request("b")).unwrap();
    let mut conn = server.accept().await;
    assert_eq!(conn.subscribed_ids(1).await.len(), 1);
    assert_eq!(connector.dials(), 2);
}

#[tokio::test]
async fn test_each_connection_fetches_a_fresh_token() {
    let (connector, mut server) = MockConnector::new();
    let (tokens, issued, _) = rotating_tokens();
    let client = client_with(
        connector.clone(),
        test_config(),
        tokens,
        ConnectionHooks::default(),
    );

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    let mut conn = server.accept().await;
    assert_eq!(conn.token, "token-A");
    conn.subscribed_ids(1).await;
    conn.disconnect();

    let mut conn = server.accept().await;
    assert_eq!(conn.token, "token-B");
    conn.subscribed_ids(1).await;

    assert_eq!(connector.tokens(), vec!["token-A", "token-B"]);
    assert_eq!(issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_token_failure_goes_idle_and_keeps_subscriptions() {
    let (connector, mut server) = MockConnector::new();
    let (tokens, _, failures) = rotating_tokens();
    failures.store(1, Ordering::SeqCst);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let e = errors.clone();
    let client = client_with(
        connector.clone(),
        test_config(),
        tokens,
        ConnectionHooks::new().on_error(move |error| {
            e.lock().unwrap().push(error.to_string());
        }),
    );

    let _first = client.subscribe::<Value>(&request("a")).unwrap();
    wait_until("idle after token failure", || {
        client.state() == ConnectionState::Idle && !client.is_running()
    })
    .await;
    server.assert_no_connection(Duration::from_millis(50)).await;
    assert_eq!(connector.dials(), 0);
    assert_eq!(client.active_subscriptions(), 1);
    assert_eq!(errors.lock().unwrap().len(), 1);
    assert!(errors.lock().unwrap()[0].contains("token service unavailable"));

    // A later subscribe restarts the connection and sends both.
    let _second = client.subscribe::<Value>(&request("b")).unwrap();
    let mut conn = server.accept().await;
    assert_eq!(conn.token, "token-B");
    assert_eq!(conn.subscribed_ids(2).await.len(), 2);
    conn.assert_silent(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_dial_failures_back_off_and_recover() {
    let (connector, mut server) = MockConnector::new();
    connector.fail_next_dials(2);
    let errors = Arc::new(AtomicUsize::new(0));
    let e = errors.clone();
    let client = client_with(
        connector.clone(),
        test_config(),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::new().on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    let mut conn = server.accept().await;
    conn.subscribed_ids(1).await;

    assert_eq!(connector.dials(), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 2);
    wait_until("running", || client.state() == ConnectionState::Running).await;
}

#[tokio::test]
async fn test_failed_keepalive_forces_reconnect() {
    let (connector, mut server) = MockConnector::new();
    let reasons = Arc::new(Mutex::new(Vec::new()));
    let r = reasons.clone();
    let client = client_with(
        connector.clone(),
        test_config().with_keepalive_interval_ms(20),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::new().on_disconnect(move |reason| {
            r.lock().unwrap().push(reason.to_string());
        }),
    );

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    let mut conn = server.accept().await;
    let ids = conn.subscribed_ids(1).await;

    // Healthy pings keep the connection.
    server.assert_no_connection(Duration::from_millis(80)).await;

    conn.fail_pings();
    let mut conn = server.accept().await;
    assert_eq!(conn.subscribed_ids(1).await, ids);

    let reasons = reasons.lock().unwrap().clone();
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains("keep-alive"), "reason: {}", reasons[0]);
}

#[tokio::test]
async fn test_close_interrupts_backoff() {
    let (connector, mut server) = MockConnector::new();
    let client = client_with(
        connector.clone(),
        test_config().with_reconnect_delay_ms(10_000, 10_000),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::default(),
    );
    connector.fail_next_dials(1);

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    wait_until("first dial", || connector.dials() == 1).await;
    wait_until("backing off", || client.state() == ConnectionState::Starting).await;

    tokio::time::timeout(Duration::from_secs(1), client.close())
        .await
        .expect("close should not wait out the backoff")
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Closed);
    server.assert_no_connection(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_close_suppresses_hooks() {
    let (connector, mut server) = MockConnector::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let (a, b) = (calls.clone(), calls.clone());
    let client = client_with(
        connector,
        test_config(),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::new()
            .on_disconnect(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            }),
    );

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    let mut conn = server.accept().await;
    conn.subscribed_ids(1).await;

    client.close().await.unwrap();
    conn.disconnect();
    conn.wait_closed().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    let (connector, mut server) = MockConnector::new();
    let client = client_with(
        connector,
        test_config(),
        Arc::new(StaticToken::new("tok")),
        ConnectionHooks::default(),
    );
    let mut states = client.state_changes();
    assert_eq!(*states.borrow(), ConnectionState::Idle);

    let _sub = client.subscribe::<Value>(&request("a")).unwrap();
    let _conn = server.accept().await;

    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|state| *state == ConnectionState::Running),
    )
    .await
    .expect("timed out waiting for running")
    .unwrap();

    client.close().await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);
}
