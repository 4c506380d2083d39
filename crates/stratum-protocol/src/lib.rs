// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratum Protocol - graphql-transport-ws over WebSocket
//!
//! This crate provides the wire layer used by `stratum-sdk` to reach the
//! automation service's real-time endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    stratum-protocol                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Socket: dial + handshake, send, receive, ping, close       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelope: graphql-transport-ws JSON messages (serde)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: WebSocket (tokio-tungstenite, rustls)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use stratum_protocol::{ClientMessage, Inbound, Socket, SocketConfig};
//!
//! let mut socket = Socket::dial("wss://automation.example.com/graphql", &token, &SocketConfig::default()).await?;
//!
//! socket
//!     .send(&ClientMessage::Subscribe {
//!         id: "1".to_string(),
//!         payload: serde_json::json!({ "query": "subscription { runUpdated { id state } }" }),
//!     })
//!     .await?;
//!
//! while let Some(Inbound::Message(message)) = socket.receive().await? {
//!     println!("{:?}", message);
//! }
//! ```

pub mod client;
pub mod message;

pub use client::{ClientError, Inbound, Socket, SocketConfig};
pub use message::{
    ClientMessage, MAX_MESSAGE_SIZE, MessageError, SUBPROTOCOL, ServerMessage,
    peek_subscription_id,
};
