// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cursor pagination.
//!
//! [`Paginator`] turns a "fetch one page" function into a forward-only
//! iterator over pages. It knows nothing about transports or item types:
//! the fetch function receives the cursor returned by the previous page
//! (`None` for the first) and returns the next [`Page`].
//!
//! ```ignore
//! let mut pages = Paginator::new(move |cursor| {
//!     let api = api.clone();
//!     async move { api.list_stacks(cursor).await }
//! });
//!
//! while pages.has_more() {
//!     for stack in pages.next_page().await? {
//!         println!("{}", stack.name);
//!     }
//! }
//! ```
//!
//! Methods take `&mut self`, so a paginator has exactly one consumer at a
//! time; share it across tasks only behind a lock.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

/// Continuation state returned with every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Opaque token to pass to the next fetch. Round-tripped verbatim.
    pub token: Option<String>,
    /// Whether the server reported more data.
    pub has_more: bool,
    /// Advisory total, possibly stale.
    pub total_count: Option<u64>,
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: PageCursor,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>, has_more: bool) -> Self {
        Self {
            items,
            cursor: PageCursor {
                token: next_cursor,
                has_more,
                total_count: None,
            },
        }
    }

    /// A final page with no continuation.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None, false)
    }

    pub fn with_total_count(mut self, total_count: u64) -> Self {
        self.cursor.total_count = Some(total_count);
        self
    }
}

/// Boxed page fetch function.
pub type BoxFetch<T, E> =
    Box<dyn FnMut(Option<String>) -> BoxFuture<'static, Result<Page<T>, E>> + Send>;

/// Stateful forward-only page iterator.
pub struct Paginator<T, E> {
    fetch: BoxFetch<T, E>,
    cursor: Option<String>,
    has_more: bool,
    total_count: Option<u64>,
    pages_fetched: u64,
}

impl<T, E> Paginator<T, E>
where
    T: 'static,
    E: 'static,
{
    pub fn new<F, Fut>(mut fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Page<T>, E>> + Send + 'static,
    {
        Self::from_boxed(Box::new(
            move |cursor: Option<String>| -> BoxFuture<'static, Result<Page<T>, E>> {
                Box::pin(fetch(cursor))
            },
        ))
    }

    pub fn from_boxed(fetch: BoxFetch<T, E>) -> Self {
        Self {
            fetch,
            cursor: None,
            has_more: true,
            total_count: None,
            pages_fetched: 0,
        }
    }
}

impl<T, E> Paginator<T, E> {
    /// True until a fetched page reports that nothing follows it.
    /// The first page is always assumed to exist.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Cursor the next fetch will be issued with.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Most recent total reported by the server, if any.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Fetch the next page.
    ///
    /// Once exhausted this returns an empty page without calling the fetch
    /// function. A fetch error is returned unchanged and leaves the cursor
    /// untouched, so calling again retries the same page.
    pub async fn next_page(&mut self) -> Result<Vec<T>, E> {
        if !self.has_more {
            debug!(pages = self.pages_fetched, "paginator exhausted");
            return Ok(Vec::new());
        }

        let page = (self.fetch)(self.cursor.clone()).await?;
        self.pages_fetched += 1;
        if page.cursor.total_count.is_some() {
            self.total_count = page.cursor.total_count;
        }

        match (page.cursor.has_more, page.cursor.token) {
            (true, Some(next)) => self.cursor = Some(next),
            (true, None) => {
                // Fetching with no cursor would restart from the first page.
                warn!(pages = self.pages_fetched, "page reported more data without a cursor, stopping");
                self.has_more = false;
            }
            (false, token) => {
                self.cursor = token;
                self.has_more = false;
            }
        }
        debug!(
            pages = self.pages_fetched,
            items = page.items.len(),
            has_more = self.has_more,
            "page fetched"
        );
        Ok(page.items)
    }

    /// Drain pages until exhaustion, or until `limit` items are gathered.
    ///
    /// Items past `limit` on the last fetched page are discarded; the
    /// paginator is left positioned after that page.
    pub async fn collect_all(&mut self, limit: Option<usize>) -> Result<Vec<T>, E> {
        let mut items = Vec::new();
        while self.has_more {
            if limit.is_some_and(|limit| items.len() >= limit) {
                break;
            }
            items.extend(self.next_page().await?);
        }
        if let Some(limit) = limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}

impl<T, E> fmt::Debug for Paginator<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paginator")
            .field("cursor", &self.cursor)
            .field("has_more", &self.has_more)
            .field("total_count", &self.total_count)
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

/// Relay-style connection (`edges { node cursor }`, `pageInfo`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConnection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    #[serde(default)]
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

impl<T> From<RelayConnection<T>> for Page<T> {
    fn from(connection: RelayConnection<T>) -> Self {
        // Fall back to the last edge's cursor when the server omits endCursor.
        let end_cursor = connection
            .page_info
            .end_cursor
            .or_else(|| connection.edges.last().and_then(|edge| edge.cursor.clone()));
        Page {
            items: connection.edges.into_iter().map(|edge| edge.node).collect(),
            cursor: PageCursor {
                token: end_cursor,
                has_more: connection.page_info.has_next_page,
                total_count: connection.total_count,
            },
        }
    }
}
