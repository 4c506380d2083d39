// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client configuration for the automation service endpoints.

use std::env;
use std::time::Duration;

use stratum_protocol::SocketConfig;

use crate::error::{Result, SdkError};

/// Longest accepted keep-alive interval (24 hours).
pub const MAX_KEEPALIVE_INTERVAL_MS: u64 = 24 * 60 * 60 * 1000;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Subscription endpoint (default: "ws://127.0.0.1:8000/graphql")
    pub ws_url: String,
    /// Query endpoint (default: "http://127.0.0.1:8000/graphql")
    pub http_url: String,
    /// Dial timeout in milliseconds (default: 10_000)
    pub connect_timeout_ms: u64,
    /// Time to wait for `connection_ack` in milliseconds (default: 10_000)
    pub ack_timeout_ms: u64,
    /// HTTP request timeout in milliseconds (default: 30_000)
    pub request_timeout_ms: u64,
    /// Keep-alive ping interval in milliseconds (default: 60_000).
    /// Set to 0 to disable pings; a stalled server then goes unnoticed.
    /// Values above [`MAX_KEEPALIVE_INTERVAL_MS`] are clamped to it.
    pub keepalive_interval_ms: u64,
    /// Base delay before re-dialing after a failed attempt (default: 500)
    pub reconnect_delay_ms: u64,
    /// Ceiling for the exponential re-dial delay (default: 30_000)
    pub max_reconnect_delay_ms: u64,
    /// Bound of each subscription's event queue (default: 1024)
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8000/graphql".to_string(),
            http_url: "http://127.0.0.1:8000/graphql".to_string(),
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            keepalive_interval_ms: 60_000,
            reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 30_000,
            event_channel_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Create a configuration pointing at the given endpoints.
    pub fn new(ws_url: impl Into<String>, http_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            http_url: http_url.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for a service running on localhost.
    pub fn localhost() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `STRATUM_WS_URL` - Subscription endpoint
    /// - `STRATUM_HTTP_URL` - Query endpoint
    /// - `STRATUM_CONNECT_TIMEOUT_MS` - Dial timeout (default: 10000)
    /// - `STRATUM_ACK_TIMEOUT_MS` - Handshake ack timeout (default: 10000)
    /// - `STRATUM_REQUEST_TIMEOUT_MS` - HTTP request timeout (default: 30000)
    /// - `STRATUM_KEEPALIVE_INTERVAL_MS` - Ping interval (default: 60000, 0 to disable)
    /// - `STRATUM_RECONNECT_DELAY_MS` - Base re-dial delay (default: 500)
    /// - `STRATUM_MAX_RECONNECT_DELAY_MS` - Re-dial delay ceiling (default: 30000)
    /// - `STRATUM_EVENT_CHANNEL_CAPACITY` - Per-subscription queue bound (default: 1024)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let number = |name: &str, default: u64| -> Result<u64> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|e| SdkError::Config(format!("invalid {}: {}", name, e))),
                None => Ok(default),
            }
        };

        let event_channel_capacity = number(
            "STRATUM_EVENT_CHANNEL_CAPACITY",
            defaults.event_channel_capacity as u64,
        )? as usize;
        if event_channel_capacity == 0 {
            return Err(SdkError::Config(
                "STRATUM_EVENT_CHANNEL_CAPACITY must be greater than zero".to_string(),
            ));
        }

        let keepalive_interval_ms = number(
            "STRATUM_KEEPALIVE_INTERVAL_MS",
            defaults.keepalive_interval_ms,
        )?;
        if keepalive_interval_ms > MAX_KEEPALIVE_INTERVAL_MS {
            return Err(SdkError::Config(format!(
                "STRATUM_KEEPALIVE_INTERVAL_MS must be at most {}",
                MAX_KEEPALIVE_INTERVAL_MS
            )));
        }

        Ok(Self {
            ws_url: lookup("STRATUM_WS_URL").unwrap_or(defaults.ws_url),
            http_url: lookup("STRATUM_HTTP_URL").unwrap_or(defaults.http_url),
            connect_timeout_ms: number("STRATUM_CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms)?,
            ack_timeout_ms: number("STRATUM_ACK_TIMEOUT_MS", defaults.ack_timeout_ms)?,
            request_timeout_ms: number("STRATUM_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?,
            keepalive_interval_ms,
            reconnect_delay_ms: number("STRATUM_RECONNECT_DELAY_MS", defaults.reconnect_delay_ms)?,
            max_reconnect_delay_ms: number(
                "STRATUM_MAX_RECONNECT_DELAY_MS",
                defaults.max_reconnect_delay_ms,
            )?,
            event_channel_capacity,
        })
    }

    /// Set the subscription endpoint.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    /// Set the query endpoint.
    pub fn with_http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = url.into();
        self
    }

    /// Set the dial timeout.
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Set the keep-alive interval. 0 disables pings.
    pub fn with_keepalive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keepalive_interval_ms = interval_ms.min(MAX_KEEPALIVE_INTERVAL_MS);
        self
    }

    /// Set the re-dial backoff bounds.
    pub fn with_reconnect_delay_ms(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_delay_ms = base_ms;
        self.max_reconnect_delay_ms = max_ms;
        self
    }

    /// Set the per-subscription queue bound.
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    pub(crate) fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            connect_timeout_ms: self.connect_timeout_ms,
            ack_timeout_ms: self.ack_timeout_ms,
        }
    }

    pub(crate) fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_ms > 0).then(|| {
            Duration::from_millis(self.keepalive_interval_ms.min(MAX_KEEPALIVE_INTERVAL_MS))
        })
    }

    /// Delay before the `failures`-th consecutive re-dial.
    ///
    /// The first re-dial after a lost connection (`failures == 0`) is immediate.
    pub(crate) fn reconnect_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
        let delay_ms = self
            .reconnect_delay_ms
            .saturating_mul(factor)
            .min(self.max_reconnect_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.ws_url, "ws://127.0.0.1:8000/graphql");
        assert_eq!(config.keepalive_interval_ms, 60_000);
        assert_eq!(config.event_channel_capacity, 1024);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("STRATUM_WS_URL", "wss://automation.example.com/graphql"),
            ("STRATUM_KEEPALIVE_INTERVAL_MS", "0"),
            ("STRATUM_RECONNECT_DELAY_MS", " 250 "),
        ]))
        .unwrap();
        assert_eq!(config.ws_url, "wss://automation.example.com/graphql");
        assert_eq!(config.http_url, "http://127.0.0.1:8000/graphql");
        assert_eq!(config.keepalive_interval_ms, 0);
        assert_eq!(config.reconnect_delay_ms, 250);
        assert!(config.keepalive_interval().is_none());
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("STRATUM_ACK_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("STRATUM_ACK_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_lookup_rejects_zero_capacity() {
        let result = ClientConfig::from_lookup(lookup(&[("STRATUM_EVENT_CHANNEL_CAPACITY", "0")]));
        assert!(matches!(result, Err(SdkError::Config(_))));
    }

    #[test]
    fn test_keepalive_interval_is_bounded() {
        let too_long = (MAX_KEEPALIVE_INTERVAL_MS + 1).to_string();
        let result = ClientConfig::from_lookup(lookup(&[(
            "STRATUM_KEEPALIVE_INTERVAL_MS",
            too_long.as_str(),
        )]));
        assert!(matches!(result, Err(SdkError::Config(_))));

        let max = u64::MAX.to_string();
        let result =
            ClientConfig::from_lookup(lookup(&[("STRATUM_KEEPALIVE_INTERVAL_MS", max.as_str())]));
        assert!(matches!(result, Err(SdkError::Config(_))));

        let config = ClientConfig::default().with_keepalive_interval_ms(u64::MAX);
        assert_eq!(config.keepalive_interval_ms, MAX_KEEPALIVE_INTERVAL_MS);

        let mut config = ClientConfig::default();
        config.keepalive_interval_ms = u64::MAX;
        assert_eq!(
            config.keepalive_interval(),
            Some(Duration::from_millis(MAX_KEEPALIVE_INTERVAL_MS))
        );
    }

    #[test]
    fn test_reconnect_delay_backoff() {
        let config = ClientConfig::default().with_reconnect_delay_ms(100, 1_000);
        assert_eq!(config.reconnect_delay(0), Duration::ZERO);
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(100));
        assert_eq!(config.reconnect_delay(2), Duration::from_millis(200));
        assert_eq!(config.reconnect_delay(4), Duration::from_millis(800));
        assert_eq!(config.reconnect_delay(5), Duration::from_millis(1_000));
        assert_eq!(config.reconnect_delay(200), Duration::from_millis(1_000));
    }

    #[test]
    fn test_socket_config_mapping() {
        let config = ClientConfig::default().with_connect_timeout_ms(1_234);
        let socket = config.socket_config();
        assert_eq!(socket.connect_timeout_ms, 1_234);
        assert_eq!(socket.ack_timeout_ms, 10_000);
    }
}
