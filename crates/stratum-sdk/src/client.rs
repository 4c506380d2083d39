// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Main subscription client.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::auth::TokenProvider;
use crate::backend::websocket::WebSocketConnector;
use crate::backend::{Connector, SubscriptionId};
use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::events::ConnectionHooks;
use crate::registry::SubscriptionInfo;
use crate::subscription::{self, Subscription};
use crate::supervisor::{ConnectionState, Supervisor};

/// Real-time subscription client.
///
/// All subscriptions of one client share a single connection, opened by the
/// first [`subscribe`](Self::subscribe) and re-established automatically
/// while any subscription is active. Must be used from within a Tokio
/// runtime.
///
/// Dropping the client stops the connection; [`close`](Self::close) does the
/// same but also waits for the connection to shut down.
pub struct SubscriptionClient {
    supervisor: Arc<Supervisor>,
    config: ClientConfig,
}

impl SubscriptionClient {
    /// Start building a client for the given configuration.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            connector: None,
            tokens: None,
            hooks: ConnectionHooks::default(),
        }
    }

    /// Create a client with the WebSocket transport and default hooks.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.socket_config()));
        Self::from_parts(config, connector, tokens, ConnectionHooks::default())
    }

    fn from_parts(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenProvider>,
        hooks: ConnectionHooks,
    ) -> Self {
        info!(endpoint = %config.ws_url, "subscription client created");
        let supervisor = Arc::new(Supervisor::new(config.clone(), connector, tokens, hooks));
        Self { supervisor, config }
    }

    /// Start a subscription.
    ///
    /// `payload` is sent verbatim as the subscribe payload (usually a
    /// [`GraphqlRequest`](crate::GraphqlRequest)); each `next` frame is
    /// decoded as a `{data, errors}` document with `data: T`. Returns once
    /// the subscription is recorded, without waiting for the connection.
    #[instrument(skip(self, payload))]
    pub fn subscribe<T>(&self, payload: impl Serialize) -> Result<Subscription<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let payload = serde_json::to_value(payload)?;
        let (deliver, events) = subscription::channel::<T>(self.config.event_channel_capacity);
        let id = self.supervisor.register(payload, deliver)?;
        debug!(subscription_id = %id, "subscription registered");
        Ok(Subscription::new(id, events, Arc::downgrade(&self.supervisor)))
    }

    /// Stop a subscription by id. A no-op if it has already ended.
    #[instrument(skip(self), fields(subscription_id = %id))]
    pub fn unsubscribe(&self, id: &SubscriptionId) -> Result<()> {
        self.supervisor.unregister(id)
    }

    /// Close the client: detach hooks, close the connection and end every
    /// subscription stream. Safe to call more than once.
    #[instrument(skip(self), fields(endpoint = %self.config.ws_url))]
    pub async fn close(&self) -> Result<()> {
        self.supervisor.close().await
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Receiver that observes every connection state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.state_changes()
    }

    /// Whether a supervisor task currently owns the connection lifecycle.
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// Number of registered subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.supervisor.active_subscriptions()
    }

    /// Snapshot of the registered subscriptions, oldest first.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.supervisor.subscriptions()
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for SubscriptionClient {
    fn drop(&mut self) {
        self.supervisor.begin_close();
    }
}

impl std::fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("endpoint", &self.config.ws_url)
            .field("state", &self.state())
            .field("active_subscriptions", &self.active_subscriptions())
            .finish()
    }
}

/// Builder for [`SubscriptionClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    tokens: Option<Arc<dyn TokenProvider>>,
    hooks: ConnectionHooks,
}

impl ClientBuilder {
    /// Use a custom transport instead of WebSocket.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the token provider. Required.
    pub fn token_provider(mut self, tokens: Arc<dyn TokenProvider>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Set connection event hooks.
    pub fn hooks(mut self, hooks: ConnectionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> Result<SubscriptionClient> {
        let tokens = self
            .tokens
            .ok_or_else(|| SdkError::Config("a token provider is required".to_string()))?;
        let connector = self
            .connector
            .unwrap_or_else(|| {
                Arc::new(WebSocketConnector::new(self.config.socket_config())) as Arc<dyn Connector>
            });
        Ok(SubscriptionClient::from_parts(
            self.config,
            connector,
            tokens,
            self.hooks,
        ))
    }
}
