// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! GraphQL-over-HTTP query executor.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::{Result, SdkError};
use crate::graphql::{GraphqlRequest, GraphqlResponse};
use crate::pagination::{Page, Paginator};

/// Executes queries and mutations against the HTTP endpoint.
///
/// Cheap to clone; clones share the connection pool and token provider.
#[derive(Clone)]
pub struct QueryClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
    request_timeout_ms: u64,
}

impl QueryClient {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| SdkError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: config.http_url.clone(),
            tokens,
            request_timeout_ms: config.request_timeout_ms,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute one request and decode its `data` as `T`.
    ///
    /// A fresh token is fetched for every request.
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint, operation = request.operation_name.as_deref().unwrap_or("")))]
    pub async fn execute<T: DeserializeOwned>(&self, request: &GraphqlRequest) -> Result<T> {
        let token = self.tokens.token().await?;

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Servers commonly pair 4xx statuses with a regular errors document.
            if let Ok(document) = serde_json::from_str::<GraphqlResponse<Value>>(&body) {
                if !document.errors.is_empty() {
                    warn!(status = status.as_u16(), errors = document.errors.len(), "request rejected");
                    return Err(SdkError::Server {
                        errors: document.errors,
                    });
                }
            }
            warn!(status = status.as_u16(), "request failed");
            return Err(SdkError::Http(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let document: GraphqlResponse<T> =
            response.json().await.map_err(|e| self.transport_error(e))?;
        debug!(errors = document.errors.len(), "response received");
        document.into_result()
    }

    fn transport_error(&self, err: reqwest::Error) -> SdkError {
        if err.is_timeout() {
            SdkError::Timeout(self.request_timeout_ms)
        } else {
            err.into()
        }
    }

    /// Build a paginator that issues one request per page.
    ///
    /// `build` turns the current cursor into a request (typically by calling
    /// [`GraphqlRequest::set_variable`] on a template) and `extract` pulls the
    /// page out of the response `data`.
    ///
    /// ```ignore
    /// let template = GraphqlRequest::new(LIST_STACKS).with_variable("first", 50)?;
    /// let mut stacks = queries.paginate(
    ///     move |cursor| {
    ///         let mut request = template.clone();
    ///         request.set_variable("after", cursor)?;
    ///         Ok(request)
    ///     },
    ///     |data: Value| {
    ///         let connection: RelayConnection<Stack> = serde_json::from_value(data["stacks"].clone())?;
    ///         Ok(connection.into())
    ///     },
    /// );
    /// ```
    pub fn paginate<T, B, X>(&self, build: B, extract: X) -> Paginator<T, SdkError>
    where
        T: Send + 'static,
        B: Fn(Option<String>) -> Result<GraphqlRequest> + Send + Sync + 'static,
        X: Fn(Value) -> Result<Page<T>> + Send + Sync + 'static,
    {
        let client = self.clone();
        let build = Arc::new(build);
        let extract = Arc::new(extract);
        Paginator::new(move |cursor| {
            let client = client.clone();
            let build = Arc::clone(&build);
            let extract = Arc::clone(&extract);
            async move {
                let request = build(cursor)?;
                let data: Value = client.execute(&request).await?;
                extract(data)
            }
        })
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("endpoint", &self.endpoint)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}
