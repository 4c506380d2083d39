// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket backend built on `stratum_protocol::Socket`.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use stratum_protocol::{ClientMessage, Inbound, Socket, SocketConfig};

use super::{Connection, Connector, SubscriptionId};
use crate::error::Result;

/// Dials graphql-transport-ws sockets.
#[derive(Debug)]
pub struct WebSocketConnector {
    config: SocketConfig,
    next_id: AtomicU64,
}

impl WebSocketConnector {
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    fn assign_id(&self) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        SubscriptionId::from(id.to_string())
    }

    async fn dial(&self, endpoint: &str, token: &str) -> Result<Box<dyn Connection>> {
        let socket = Socket::dial(endpoint, token, &self.config).await?;
        Ok(Box::new(WebSocketConnection { socket }))
    }
}

struct WebSocketConnection {
    socket: Socket,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        Ok(self.socket.send(&message).await?)
    }

    async fn receive(&mut self) -> Result<Option<Inbound>> {
        Ok(self.socket.receive().await?)
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(self.socket.ping().await?)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(self.socket.close().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_ids_are_unique() {
        let connector = WebSocketConnector::new(SocketConfig::default());
        let a = connector.assign_id();
        let b = connector.assign_id();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "1");
        assert_eq!(b.to_string(), "2");
    }

    #[tokio::test]
    async fn test_dial_failure_maps_to_connect_error() {
        let connector = WebSocketConnector::new(SocketConfig::default());
        let result = connector.dial("not a url", "tok").await;
        assert!(matches!(result, Err(crate::SdkError::Connect(_))));
    }
}
