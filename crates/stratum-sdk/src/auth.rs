// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auth token providers.
//!
//! The client asks its provider for a token on every connection attempt and
//! every HTTP request. Nothing is cached here, so providers are free to
//! rotate credentials between calls.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::error::{Result, SdkError};

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch the token to use for the next connection or request.
    async fn token(&self) -> Result<String>;
}

/// A provider that always returns the same token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"<redacted>").finish()
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(SdkError::Auth("empty token".to_string()));
        }
        Ok(self.0.clone())
    }
}

/// A provider backed by an async closure.
///
/// ```ignore
/// let tokens = FnTokenProvider::new(move || {
///     let vault = vault.clone();
///     async move { vault.current_token().await }
/// });
/// ```
pub struct FnTokenProvider<F> {
    fetch: F,
}

impl<F> FnTokenProvider<F> {
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<String>> + Send,
{
    async fn token(&self) -> Result<String> {
        (self.fetch)().await
    }
}
