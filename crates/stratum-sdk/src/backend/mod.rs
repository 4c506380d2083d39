// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport backends for the subscription supervisor.
//!
//! The supervisor only ever talks to a [`Connector`] (to dial) and the
//! [`Connection`] it returns (to exchange frames). `websocket` is the
//! production implementation; tests plug in scripted in-memory ones.

pub mod websocket;

use std::fmt;

use async_trait::async_trait;
use stratum_protocol::{ClientMessage, Inbound};

use crate::error::Result;

/// Opaque identifier of one subscription, assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SubscriptionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Factory for transport connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Hand out a fresh subscription identifier, unique for this connector.
    fn assign_id(&self) -> SubscriptionId;

    /// Open and authenticate a connection to `endpoint`.
    async fn dial(&self, endpoint: &str, token: &str) -> Result<Box<dyn Connection>>;
}

/// One established duplex connection.
///
/// Owned exclusively by the supervisor task.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Wait for the next frame. `Ok(None)` means the peer closed the connection.
    ///
    /// Must be cancel-safe: the supervisor races it against other events.
    async fn receive(&mut self) -> Result<Option<Inbound>>;

    /// Send a keep-alive probe.
    async fn ping(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
