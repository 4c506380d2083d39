// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Connection event hooks.

use std::fmt;
use std::sync::Arc;

use crate::error::SdkError;

type ConnectHook = Arc<dyn Fn() + Send + Sync>;
type DisconnectHook = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&SdkError) + Send + Sync>;

/// Optional callbacks fired by the connection supervisor.
///
/// Hooks run on the supervisor task and must not block. They are the only
/// place connection-level failures surface besides `tracing` output.
/// `SubscriptionClient::close` detaches all hooks before tearing the
/// connection down.
#[derive(Clone, Default)]
pub struct ConnectionHooks {
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
    on_error: Option<ErrorHook>,
}

impl ConnectionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called each time a connection is acknowledged.
    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Called with a reason when an established connection is lost.
    pub fn on_disconnect(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Called for dial, auth and keep-alive failures.
    pub fn on_error(mut self, hook: impl Fn(&SdkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub(crate) fn emit_connect(&self) {
        if let Some(hook) = &self.on_connect {
            hook();
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: &str) {
        if let Some(hook) = &self.on_disconnect {
            hook(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: &SdkError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

impl fmt::Debug for ConnectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHooks")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
