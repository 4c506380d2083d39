// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebSocket socket for talking graphql-transport-ws to the automation service.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

use crate::message::{
    ClientMessage, MessageError, SUBPROTOCOL, ServerMessage, peek_subscription_id,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors that can occur on the socket
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server rejected connection with HTTP {0}")]
    Rejected(u16),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("no frame received since the previous ping")]
    Unresponsive,

    #[error("connection closed")]
    Closed,
}

/// Timeouts applied while establishing a socket
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// TCP/TLS/WebSocket upgrade timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Time to wait for `connection_ack` in milliseconds
    pub ack_timeout_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 10_000,
        }
    }
}

/// One inbound frame as seen by the caller of [`Socket::receive`].
#[derive(Debug)]
pub enum Inbound {
    /// A well-formed server message.
    Message(ServerMessage),
    /// A frame that could not be decoded. `subscription_id` is set when the
    /// frame still carried a recognisable `id` field.
    Malformed {
        subscription_id: Option<String>,
        error: MessageError,
    },
}

/// An established, acknowledged graphql-transport-ws socket.
///
/// Besides the stream, the socket only remembers whether its last ping is
/// still unanswered.
pub struct Socket {
    stream: WsStream,
    endpoint: String,
    awaiting_pong: bool,
}

impl Socket {
    /// Dial `endpoint`, authenticate with `token`, and wait for `connection_ack`.
    ///
    /// The token travels both as an `Authorization` header on the upgrade
    /// request and inside the `connection_init` payload, since servers differ
    /// on where they look for it.
    #[instrument(skip(token, config))]
    pub async fn dial(
        endpoint: &str,
        token: &str,
        config: &SocketConfig,
    ) -> Result<Self, ClientError> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        let headers = request.headers_mut();
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::Handshake(format!("invalid token header: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);

        debug!("opening websocket");
        let connecting = tokio_tungstenite::connect_async(request);
        let stream = match tokio::time::timeout(
            Duration::from_millis(config.connect_timeout_ms),
            connecting,
        )
        .await
        {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(tokio_tungstenite::tungstenite::Error::Http(response))) => {
                return Err(ClientError::Rejected(response.status().as_u16()));
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::Timeout(config.connect_timeout_ms)),
        };

        let mut socket = Self {
            stream,
            endpoint: endpoint.to_string(),
            awaiting_pong: false,
        };

        socket.send(&ClientMessage::connection_init(token)).await?;
        tokio::time::timeout(
            Duration::from_millis(config.ack_timeout_ms),
            socket.await_ack(),
        )
        .await
        .map_err(|_| ClientError::Timeout(config.ack_timeout_ms))??;

        info!("websocket acknowledged");
        Ok(socket)
    }

    async fn await_ack(&mut self) -> Result<(), ClientError> {
        loop {
            match self.receive().await? {
                Some(Inbound::Message(ServerMessage::ConnectionAck { .. })) => return Ok(()),
                Some(Inbound::Message(other)) => {
                    return Err(ClientError::Handshake(format!(
                        "expected connection_ack, got {:?}",
                        other
                    )));
                }
                Some(Inbound::Malformed { error, .. }) => {
                    return Err(ClientError::Handshake(error.to_string()));
                }
                None => {
                    return Err(ClientError::Handshake(
                        "connection closed before ack".to_string(),
                    ));
                }
            }
        }
    }

    /// Endpoint this socket was dialed against.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one envelope message.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = message.encode()?;
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Block until the next application frame arrives.
    ///
    /// Returns `Ok(None)` once the server closes the connection. WebSocket
    /// control frames and graphql-transport-ws `ping`s are answered here and
    /// never surface to the caller. Dropping the returned future between
    /// frames loses nothing, so it can be raced in `tokio::select!`.
    pub async fn receive(&mut self) -> Result<Option<Inbound>, ClientError> {
        loop {
            let frame = match self.stream.next().await {
                Some(frame) => frame?,
                None => return Ok(None),
            };
            // Any frame proves the server is still reading and writing.
            self.awaiting_pong = false;

            let bytes: Bytes = match frame {
                Message::Text(text) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                Message::Binary(data) => data,
                Message::Ping(payload) => {
                    self.stream.send(Message::Pong(payload)).await?;
                    continue;
                }
                Message::Pong(_) => {
                    debug!("keepalive pong received");
                    continue;
                }
                Message::Close(frame) => {
                    debug!(?frame, "server closed websocket");
                    return Ok(None);
                }
                Message::Frame(_) => continue,
            };

            match ServerMessage::decode(&bytes) {
                Ok(ServerMessage::Ping { payload }) => {
                    self.send(&ClientMessage::Pong { payload }).await?;
                }
                Ok(message) => return Ok(Some(Inbound::Message(message))),
                Err(error) => {
                    warn!(error = %error, "undecodable frame");
                    return Ok(Some(Inbound::Malformed {
                        subscription_id: peek_subscription_id(&bytes),
                        error,
                    }));
                }
            }
        }
    }

    /// Send a WebSocket ping frame.
    ///
    /// Fails with [`ClientError::Unresponsive`] when nothing at all has been
    /// received since the previous ping, so a caller pinging on a fixed
    /// interval detects a stalled server within two intervals. The answer is
    /// only observed by [`receive`](Self::receive), which must be polled in
    /// between.
    pub async fn ping(&mut self) -> Result<(), ClientError> {
        if self.awaiting_pong {
            warn!(endpoint = %self.endpoint, "previous ping unanswered");
            return Err(ClientError::Unresponsive);
        }
        self.stream.send(Message::Ping(Bytes::new())).await?;
        self.awaiting_pong = true;
        Ok(())
    }

    /// Perform the closing handshake and release the socket.
    pub async fn close(&mut self) -> Result<(), ClientError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
