// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SDK-specific error types.

use stratum_protocol::ClientError;
use thiserror::Error;

use crate::graphql::GraphqlError;

/// Errors that can occur in the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (missing or invalid environment variable)
    #[error("configuration error: {0}")]
    Config(String),

    /// Dial or handshake failure on the subscription transport
    #[error("connect error: {0}")]
    Connect(#[from] ClientError),

    /// The token provider could not produce a credential
    #[error("auth error: {0}")]
    Auth(String),

    /// Malformed or unexpected inbound frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A subscription's decode/delivery step failed; the subscription is over
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Server reported GraphQL errors
    #[error("server error: {}", format_graphql_errors(errors))]
    Server {
        /// Errors as reported by the server
        errors: Vec<GraphqlError>,
    },

    /// HTTP transport failure or non-success status
    #[error("http error: {0}")]
    Http(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Request did not complete within the configured timeout
    #[error("timed out after {0}ms")]
    Timeout(u64),

    /// The client was closed
    #[error("client closed")]
    Closed,
}

fn format_graphql_errors(errors: &[GraphqlError]) -> String {
    if errors.is_empty() {
        return "unspecified".to_string();
    }
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Serialization(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for SdkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SdkError::Http(format!("request timed out: {}", err))
        } else if err.is_decode() {
            SdkError::Serialization(err.to_string())
        } else {
            SdkError::Http(err.to_string())
        }
    }
}

/// Type alias for SDK results.
pub type Result<T> = std::result::Result<T, SdkError>;
