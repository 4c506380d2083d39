// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Wire envelope for the graphql-transport-ws sub-protocol.
//!
//! Every WebSocket text frame carries one JSON object with a `type` tag:
//!
//! ```text
//! client -> server   connection_init | subscribe | complete | ping | pong
//! server -> client   connection_ack  | next | error | complete | ping | pong
//! ```
//!
//! Subscribe payloads and `next`/`error` payloads are opaque JSON documents;
//! this layer never looks inside them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// WebSocket sub-protocol negotiated during the handshake.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Maximum accepted text/binary message size (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Errors that can occur while encoding or decoding envelope messages
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    TooLarge(usize),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on every connection; carries authentication metadata.
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Start an operation under the given identifier.
    Subscribe { id: String, payload: Value },
    /// Stop the operation with the given identifier.
    Complete { id: String },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// One result for an operation.
    Next { id: String, payload: Value },
    /// Operation failed; the server sends nothing more for this id.
    Error { id: String, payload: Value },
    /// Operation finished; the server sends nothing more for this id.
    Complete { id: String },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl ClientMessage {
    /// Create a `connection_init` carrying a bearer token.
    pub fn connection_init(token: &str) -> Self {
        ClientMessage::ConnectionInit {
            payload: Some(serde_json::json!({ "Authorization": format!("Bearer {}", token) })),
        }
    }

    /// Encode to the JSON text carried in a WebSocket text frame.
    pub fn encode(&self) -> Result<String, MessageError> {
        let text = serde_json::to_string(self)?;
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge(text.len()));
        }
        Ok(text)
    }
}

impl ServerMessage {
    /// Decode from the bytes of a text or binary WebSocket frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(MessageError::TooLarge(bytes.len()));
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Subscription identifier this frame belongs to, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Next { id, .. }
            | ServerMessage::Error { id, .. }
            | ServerMessage::Complete { id } => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Best-effort extraction of the `id` field from a frame that failed to decode.
///
/// Lets the caller attribute a malformed frame to a subscription.
pub fn peek_subscription_id(bytes: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}
