// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lazy connection supervisor.
//!
//! One supervisor owns the single transport connection of a client. It is
//! spawned by the first registration, re-dials whenever the connection drops
//! while subscriptions remain, parks itself when none do, and exits for good
//! on close.
//!
//! ```text
//!            Spawned            Connected
//!   Idle ─────────────▶ Starting ─────────▶ Running
//!    ▲  ◀───────────────┘  ▲  │                │
//!    │     AuthFailed      │  │ DialFailed     │ Lost
//!    │                     │  ▼                ▼
//!    │                 Settled(n > 0)     Disconnected
//!    └──────────────── Settled(0) ◀──────────┘
//!
//!   any state ── CloseRequested ──▶ Closed (terminal)
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::Value;
use stratum_protocol::ClientMessage;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenProvider;
use crate::backend::{Connection, Connector, SubscriptionId};
use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::events::ConnectionHooks;
use crate::registry::{Deliver, Dispatch, SubscriptionInfo, SubscriptionRegistry};

/// Upper bound on a best-effort close of a connection being abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no supervisor task.
    Idle,
    /// Fetching a token and dialing.
    Starting,
    /// Connected and dispatching frames.
    Running,
    /// The connection was lost or the dial failed.
    Disconnected,
    /// Shut down; never restarts.
    Closed,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Spawned,
    Connected,
    AuthFailed,
    DialFailed,
    Lost,
    Settled { subscriptions: usize },
    CloseRequested,
}

impl ConnectionState {
    /// Pure transition function. Pairs with no defined transition leave the
    /// state unchanged; `Closed` absorbs everything.
    pub(crate) fn transition(self, event: Transition) -> ConnectionState {
        use ConnectionState::*;
        match (self, event) {
            (Closed, _) => Closed,
            (_, Transition::CloseRequested) => Closed,
            (Idle, Transition::Spawned) => Starting,
            (Starting, Transition::Connected) => Running,
            (Starting, Transition::AuthFailed) => Idle,
            (Starting, Transition::DialFailed) => Disconnected,
            (Running, Transition::Lost) => Disconnected,
            (Disconnected, Transition::Settled { subscriptions }) if subscriptions > 0 => Starting,
            (Disconnected, Transition::Settled { .. }) => Idle,
            (state, _) => state,
        }
    }
}

enum Command {
    Subscribe(SubscriptionId),
    Unsubscribe(SubscriptionId),
}

enum Exit {
    Shutdown,
    Lost(String),
}

#[derive(Default)]
struct Control {
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

pub(crate) struct Supervisor {
    endpoint: String,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenProvider>,
    config: ClientConfig,
    registry: SubscriptionRegistry,
    hooks: RwLock<ConnectionHooks>,
    running: AtomicBool,
    closed: AtomicBool,
    control: Mutex<Control>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenProvider>,
        hooks: ConnectionHooks,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            endpoint: config.ws_url.clone(),
            connector,
            tokens,
            config,
            registry: SubscriptionRegistry::new(),
            hooks: RwLock::new(hooks),
            running: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            control: Mutex::new(Control::default()),
            state,
            shutdown: CancellationToken::new(),
        }
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn hooks(&self) -> ConnectionHooks {
        self.hooks.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn advance(&self, event: Transition) {
        self.state.send_if_modified(|state| {
            let current = *state;
            let next = current.transition(event);
            if next == current {
                return false;
            }
            debug!(from = ?current, to = ?next, ?event, "connection state changed");
            *state = next;
            true
        });
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn active_subscriptions(&self) -> usize {
        self.registry.len()
    }

    pub(crate) fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.info()
    }

    /// Record a subscription and make sure a supervisor task will send it.
    ///
    /// Returns as soon as the subscription is recorded; the connection is
    /// established in the background.
    pub(crate) fn register(self: &Arc<Self>, payload: Value, deliver: Deliver) -> Result<SubscriptionId> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SdkError::Closed);
        }
        let id = self.connector.assign_id();
        self.registry.insert(id.clone(), payload, deliver)?;

        let mut control = self.control();
        if self.closed.load(Ordering::SeqCst) {
            drop(control);
            self.registry.remove(&id);
            return Err(SdkError::Closed);
        }
        if !self.running.load(Ordering::SeqCst) {
            let (tx, rx) = mpsc::unbounded_channel();
            self.running.store(true, Ordering::SeqCst);
            self.advance(Transition::Spawned);
            control.commands = Some(tx);
            control.task = Some(tokio::spawn(Arc::clone(self).run(rx)));
            debug!(subscription_id = %id, "supervisor spawned");
        }
        if let Some(commands) = &control.commands {
            // Lost sends are covered by the replay on the next connect.
            let _ = commands.send(Command::Subscribe(id.clone()));
        }
        Ok(id)
    }

    /// Forget a subscription and tell the server to stop it. A no-op if the
    /// id is unknown.
    pub(crate) fn unregister(&self, id: &SubscriptionId) -> Result<()> {
        if !self.registry.remove(id) {
            debug!(subscription_id = %id, "unregister of unknown subscription ignored");
            return Ok(());
        }
        debug!(subscription_id = %id, "subscription unregistered");
        let control = self.control();
        if let Some(commands) = &control.commands {
            let _ = commands.send(Command::Unsubscribe(id.clone()));
        }
        Ok(())
    }

    /// Mark the supervisor closed, detach hooks and signal the task.
    ///
    /// Returns false if it was already closed.
    pub(crate) fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.hooks.write().unwrap_or_else(|e| e.into_inner()) = ConnectionHooks::default();
        self.advance(Transition::CloseRequested);
        self.shutdown.cancel();
        true
    }

    /// Shut down for good. Idempotent.
    pub(crate) async fn close(&self) -> Result<()> {
        if !self.begin_close() {
            debug!("close called on an already closed client");
            return Ok(());
        }
        let task = {
            let mut control = self.control();
            self.running.store(false, Ordering::SeqCst);
            control.commands = None;
            control.task.take()
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "supervisor task ended abnormally");
            }
        }
        self.registry.clear();
        info!(endpoint = %self.endpoint, "subscription client closed");
        Ok(())
    }

    /// Decide what follows a disconnect. Returns true to re-dial.
    fn settle(&self) -> bool {
        let mut control = self.control();
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let subscriptions = self.registry.len();
        self.advance(Transition::Settled { subscriptions });
        if subscriptions == 0 {
            self.running.store(false, Ordering::SeqCst);
            control.commands = None;
            info!("no subscriptions left, connection going idle");
            return false;
        }
        true
    }

    /// Stop after an auth failure. Registrations are kept; the next
    /// `register` starts a new supervisor.
    fn park(&self) {
        let mut control = self.control();
        self.advance(Transition::AuthFailed);
        self.running.store(false, Ordering::SeqCst);
        control.commands = None;
    }

    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn run(self: Arc<Self>, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut failures: u32 = 0;
        loop {
            let token = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                token = self.tokens.token() => token,
            };
            let token = match token {
                Ok(token) => token,
                Err(e) => {
                    let error = match e {
                        SdkError::Auth(_) => e,
                        other => SdkError::Auth(other.to_string()),
                    };
                    warn!(error = %error, "token fetch failed, connection going idle");
                    self.hooks().emit_error(&error);
                    self.park();
                    return;
                }
            };

            let dialed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                dialed = self.connector.dial(&self.endpoint, &token) => dialed,
            };

            match dialed {
                Ok(connection) => {
                    failures = 0;
                    self.advance(Transition::Connected);
                    info!(subscriptions = self.registry.len(), "connection established");
                    self.hooks().emit_connect();
                    match self.drive(connection, &mut commands).await {
                        Exit::Shutdown => return,
                        Exit::Lost(reason) => {
                            if !self.closed.load(Ordering::SeqCst) {
                                warn!(reason = %reason, "connection lost");
                                self.hooks().emit_disconnect(&reason);
                            }
                            self.advance(Transition::Lost);
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %e, attempt = failures, "dial failed");
                    self.hooks().emit_error(&e);
                    self.advance(Transition::DialFailed);
                }
            }

            if !self.settle() {
                return;
            }
            let delay = self.config.reconnect_delay(failures);
            debug!(delay_ms = delay.as_millis() as u64, "re-dialing");
            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// Run one established connection until it is lost or shutdown is requested.
    async fn drive(
        &self,
        mut connection: Box<dyn Connection>,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Exit {
        let mut started: HashSet<SubscriptionId> = HashSet::new();

        for (id, payload) in self.registry.requests() {
            if let Err(e) = send_subscribe(connection.as_mut(), &id, payload).await {
                abandon(connection.as_mut()).await;
                return Exit::Lost(format!("subscribe failed: {}", e));
            }
            started.insert(id);
        }
        if !started.is_empty() {
            debug!(count = started.len(), "subscriptions sent");
        }

        let mut keepalive = self.config.keepalive_interval().and_then(|period| {
            let Some(start) = Instant::now().checked_add(period) else {
                warn!(
                    period_ms = period.as_millis() as u64,
                    "keep-alive interval out of range, pings disabled"
                );
                return None;
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        });

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Event::Shutdown,
                Some(command) = commands.recv() => Event::Command(command),
                _ = next_tick(&mut keepalive) => Event::Keepalive,
                frame = connection.receive() => Event::Frame(frame),
            };

            let outcome = match event {
                Event::Shutdown => {
                    abandon(connection.as_mut()).await;
                    return Exit::Shutdown;
                }
                Event::Command(Command::Subscribe(id)) => {
                    if started.contains(&id) {
                        continue;
                    }
                    let Some(payload) = self.registry.payload(&id) else {
                        continue;
                    };
                    let sent = send_subscribe(connection.as_mut(), &id, payload).await;
                    started.insert(id);
                    sent.map_err(|e| format!("subscribe failed: {}", e))
                }
                Event::Command(Command::Unsubscribe(id)) => {
                    if !started.remove(&id) {
                        continue;
                    }
                    send_complete(connection.as_mut(), &id)
                        .await
                        .map_err(|e| format!("complete failed: {}", e))
                }
                Event::Keepalive => connection.ping().await.map_err(|e| {
                    self.hooks().emit_error(&e);
                    format!("keep-alive ping failed: {}", e)
                }),
                Event::Frame(Ok(Some(inbound))) => {
                    let dispatched = tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => None,
                        outcome = self.registry.dispatch(inbound) => Some(outcome),
                    };
                    // Inbound traffic proves liveness. Restarting the period
                    // also gives `receive` a turn to read the pong of a ping
                    // sent before a long dispatch wait.
                    if let Some(interval) = keepalive.as_mut() {
                        interval.reset();
                    }
                    match dispatched {
                        None => {
                            abandon(connection.as_mut()).await;
                            return Exit::Shutdown;
                        }
                        Some(Dispatch::Terminated(id)) => {
                            started.remove(&id);
                            send_complete(connection.as_mut(), &id)
                                .await
                                .map_err(|e| format!("complete failed: {}", e))
                        }
                        Some(Dispatch::Finished(id)) => {
                            started.remove(&id);
                            Ok(())
                        }
                        Some(_) => Ok(()),
                    }
                }
                Event::Frame(Ok(None)) => Err("server closed the connection".to_string()),
                Event::Frame(Err(e)) => Err(format!("receive failed: {}", e)),
            };

            if let Err(reason) = outcome {
                abandon(connection.as_mut()).await;
                return Exit::Lost(reason);
            }
        }
    }
}

enum Event {
    Shutdown,
    Command(Command),
    Keepalive,
    Frame(Result<Option<stratum_protocol::Inbound>>),
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn send_subscribe(
    connection: &mut dyn Connection,
    id: &SubscriptionId,
    payload: Value,
) -> Result<()> {
    connection
        .send(ClientMessage::Subscribe {
            id: id.to_string(),
            payload,
        })
        .await
}

async fn send_complete(connection: &mut dyn Connection, id: &SubscriptionId) -> Result<()> {
    connection
        .send(ClientMessage::Complete { id: id.to_string() })
        .await
}

/// Best-effort close of a connection that is being given up.
async fn abandon(connection: &mut dyn Connection) {
    match tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close failed"),
        Err(_) => debug!("close timed out"),
    }
}
