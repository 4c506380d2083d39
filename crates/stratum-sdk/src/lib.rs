// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stratum SDK - Real-time subscriptions and cursor pagination for the
//! automation service's GraphQL API.
//!
//! This crate provides the two pieces every higher-level API wrapper builds
//! on: a subscription client that turns one-shot subscribe calls into durable
//! event streams over a single shared connection, and a generic paginator
//! that drives any "fetch one page" function.
//!
//! # Features
//!
//! - **Shared Connection**: All subscriptions multiplex over one WebSocket
//! - **Lazy Start**: The connection opens on the first subscription
//! - **Auto Reconnect**: Lost connections are re-established while subscriptions remain,
//!   and every subscription is re-sent on the new connection
//! - **Token Rotation**: A fresh auth token is fetched for every connection attempt
//! - **Keep-alive**: Periodic pings detect a stalled server
//! - **Cursor Pagination**: Forward-only, retry-safe page iteration
//! - **HTTP Queries**: Queries and mutations over `reqwest` (feature `http`, on by default)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stratum_sdk::{ClientConfig, GraphqlRequest, StaticToken, SubscriptionClient};
//!
//! #[derive(serde::Deserialize)]
//! struct RunUpdated {
//!     id: String,
//!     state: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> stratum_sdk::Result<()> {
//!     let client = SubscriptionClient::builder(ClientConfig::from_env()?)
//!         .token_provider(Arc::new(StaticToken::new(std::env::var("STRATUM_TOKEN").unwrap_or_default())))
//!         .build()?;
//!
//!     let request = GraphqlRequest::new("subscription { runUpdated { id state } }");
//!     let mut runs = client.subscribe::<RunUpdated>(&request)?;
//!
//!     while let Some(event) = runs.recv().await {
//!         let run = event?;
//!         println!("{} -> {}", run.id, run.state);
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! Idle ──subscribe──▶ Starting ──ack──▶ Running ──lost──▶ Disconnected
//!   ▲                   │  ▲                                │
//!   └── token failure ──┘  └──── subscriptions remain ──────┤
//!   ▲                                                       │
//!   └─────────────────── no subscriptions ──────────────────┘
//! ```
//!
//! `close()` moves the client to `Closed` from any state. Connection-level
//! failures never reach subscribers as errors; they show up in `tracing`
//! output and in the optional [`ConnectionHooks`].
//!
//! # Pagination
//!
//! ```ignore
//! use stratum_sdk::{Page, Paginator};
//!
//! let mut pages = Paginator::new(|cursor: Option<String>| async move {
//!     let (items, next) = list_stacks(cursor).await?;
//!     Ok::<_, MyError>(Page::new(items, next.clone(), next.is_some()))
//! });
//!
//! while pages.has_more() {
//!     let stacks = pages.next_page().await?;
//!     // ...
//! }
//! ```
//!
//! # Configuration
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `STRATUM_WS_URL` | `ws://127.0.0.1:8000/graphql` | Subscription endpoint |
//! | `STRATUM_HTTP_URL` | `http://127.0.0.1:8000/graphql` | Query endpoint |
//! | `STRATUM_CONNECT_TIMEOUT_MS` | `10000` | Dial timeout |
//! | `STRATUM_ACK_TIMEOUT_MS` | `10000` | Handshake ack timeout |
//! | `STRATUM_REQUEST_TIMEOUT_MS` | `30000` | HTTP request timeout |
//! | `STRATUM_KEEPALIVE_INTERVAL_MS` | `60000` | Ping interval, 0 disables, at most 24h |
//! | `STRATUM_RECONNECT_DELAY_MS` | `500` | Base re-dial backoff |
//! | `STRATUM_MAX_RECONNECT_DELAY_MS` | `30000` | Re-dial backoff ceiling |
//! | `STRATUM_EVENT_CHANNEL_CAPACITY` | `1024` | Per-subscription queue bound |

mod auth;
pub mod backend;
mod client;
mod config;
mod error;
mod events;
mod graphql;
mod pagination;
#[cfg(feature = "http")]
mod query;
mod registry;
mod subscription;
mod supervisor;

pub use auth::{FnTokenProvider, StaticToken, TokenProvider};
pub use backend::websocket::WebSocketConnector;
pub use backend::{Connection, Connector, SubscriptionId};
pub use client::{ClientBuilder, SubscriptionClient};
pub use config::{ClientConfig, MAX_KEEPALIVE_INTERVAL_MS};
pub use error::{Result, SdkError};
pub use events::ConnectionHooks;
pub use graphql::{GraphqlError, GraphqlLocation, GraphqlRequest, GraphqlResponse};
pub use pagination::{BoxFetch, Edge, Page, PageCursor, PageInfo, Paginator, RelayConnection};
#[cfg(feature = "http")]
pub use query::QueryClient;
pub use registry::SubscriptionInfo;
pub use subscription::Subscription;
pub use supervisor::ConnectionState;

// Re-export the wire types needed to implement a custom `Connection`.
pub use stratum_protocol::{ClientMessage, Inbound, ServerMessage};
