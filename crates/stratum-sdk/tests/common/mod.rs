// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test utilities: an in-memory transport whose server side is driven
//! by the test.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stratum_protocol::ClientError;
use stratum_sdk::{
    ClientConfig, ClientMessage, Connection, Connector, Inbound, Result, SdkError, ServerMessage,
    SubscriptionId,
};
use tokio::sync::mpsc;

pub const WAIT: Duration = Duration::from_secs(5);

/// Install a test subscriber once; `RUST_LOG=stratum_sdk=debug` shows logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config tuned for fast tests: no keep-alive, tiny backoff.
pub fn test_config() -> ClientConfig {
    ClientConfig::new("mem://automation/graphql", "http://127.0.0.1:0/graphql")
        .with_keepalive_interval_ms(0)
        .with_reconnect_delay_ms(10, 50)
}

/// Poll `condition` until it holds, panicking after [`WAIT`].
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Connector whose connections are handed to the test as [`ServerHandle`]s.
pub struct MockConnector {
    next_id: AtomicU64,
    dials: AtomicUsize,
    failing_dials: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    accepted: mpsc::UnboundedSender<ServerHandle>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, Server) {
        let (accepted, handles) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            next_id: AtomicU64::new(1),
            dials: AtomicUsize::new(0),
            failing_dials: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, Server { handles })
    }

    /// Number of dial attempts, successful or not.
    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Tokens presented by each dial attempt, in order.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    /// Make the next `count` dials fail.
    pub fn fail_next_dials(&self, count: usize) {
        self.failing_dials.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn assign_id(&self) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        SubscriptionId::from(format!("sub-{}", id))
    }

    async fn dial(&self, _endpoint: &str, token: &str) -> Result<Box<dyn Connection>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());

        let failing = self.failing_dials.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_dials.store(failing - 1, Ordering::SeqCst);
            return Err(SdkError::Connect(ClientError::Rejected(503)));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let fail_pings = Arc::new(AtomicBool::new(false));
        let handle = ServerHandle {
            token: token.to_string(),
            sent: sent_rx,
            inbound: inbound_tx,
            fail_pings: fail_pings.clone(),
        };
        let _ = self.accepted.send(handle);
        Ok(Box::new(MockConnection {
            sent: sent_tx,
            inbound: inbound_rx,
            fail_pings,
        }))
    }
}

struct MockConnection {
    sent: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<Option<Inbound>>,
    fail_pings: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.sent
            .send(message)
            .map_err(|_| SdkError::Connect(ClientError::Closed))
    }

    async fn receive(&mut self) -> Result<Option<Inbound>> {
        Ok(self.inbound.recv().await.flatten())
    }

    async fn ping(&mut self) -> Result<()> {
        if self.fail_pings.load(Ordering::SeqCst) {
            return Err(SdkError::Connect(ClientError::Closed));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inbound.close();
        Ok(())
    }
}

/// Stream of accepted connections.
pub struct Server {
    handles: mpsc::UnboundedReceiver<ServerHandle>,
}

impl Server {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> ServerHandle {
        tokio::time::timeout(WAIT, self.handles.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Assert no connection is accepted within `window`.
    pub async fn assert_no_connection(&mut self, window: Duration) {
        if let Ok(Some(_)) = tokio::time::timeout(window, self.handles.recv()).await {
            panic!("unexpected connection");
        }
    }
}

/// Server side of one in-memory connection.
pub struct ServerHandle {
    pub token: String,
    sent: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<Option<Inbound>>,
    fail_pings: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Next message the client sent on this connection.
    pub async fn recv(&mut self) -> ClientMessage {
        tokio::time::timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for a client message")
            .expect("connection closed")
    }

    /// Collect `count` subscribe messages, returning their ids sorted.
    pub async fn subscribed_ids(&mut self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            match self.recv().await {
                ClientMessage::Subscribe { id, .. } => ids.push(id),
                other => panic!("expected subscribe, got {:?}", other),
            }
        }
        ids.sort();
        ids
    }

    /// Assert the client sends nothing within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(window, self.sent.recv()).await {
            panic!("unexpected client message: {:?}", message);
        }
    }

    pub fn push(&self, message: ServerMessage) {
        let _ = self.inbound.send(Some(Inbound::Message(message)));
    }

    pub fn next(&self, id: &str, payload: Value) {
        self.push(ServerMessage::Next {
            id: id.to_string(),
            payload,
        });
    }

    pub fn error(&self, id: &str, payload: Value) {
        self.push(ServerMessage::Error {
            id: id.to_string(),
            payload,
        });
    }

    pub fn complete(&self, id: &str) {
        self.push(ServerMessage::Complete { id: id.to_string() });
    }

    pub fn push_raw(&self, inbound: Inbound) {
        let _ = self.inbound.send(Some(inbound));
    }

    /// Make keep-alive pings on this connection fail.
    pub fn fail_pings(&self) {
        self.fail_pings.store(true, Ordering::SeqCst);
    }

    /// Wait until the client has dropped this connection.
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(WAIT, async {
            while self.sent.recv().await.is_some() {}
        })
        .await
        .expect("timed out waiting for the client to drop the connection");
    }

    /// Simulate the server dropping the connection.
    pub fn disconnect(&self) {
        let _ = self.inbound.send(None);
    }
}
