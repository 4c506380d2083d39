// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed subscription handles.

use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::backend::SubscriptionId;
use crate::error::{Result, SdkError};
use crate::graphql::GraphqlResponse;
use crate::registry::{Deliver, Delivery};
use crate::supervisor::Supervisor;

/// Receive side of one subscription.
///
/// Yields `Ok(event)` for every `next` frame and `Err(..)` for errors the
/// server or protocol attributed to this subscription. The stream ends
/// (`recv` returns `None`) once the subscription is unsubscribed, ended by
/// the server, failed to decode an event, or the client is closed.
///
/// Dropping the handle without calling [`unsubscribe`](Self::unsubscribe)
/// also ends the subscription: the next event finds no receiver and the
/// server is told to stop.
pub struct Subscription<T> {
    id: SubscriptionId,
    events: mpsc::Receiver<Result<T>>,
    supervisor: Weak<Supervisor>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriptionId,
        events: mpsc::Receiver<Result<T>>,
        supervisor: Weak<Supervisor>,
    ) -> Self {
        Self {
            id,
            events,
            supervisor,
        }
    }

    /// Transport-assigned identifier of this subscription.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<Result<T>> {
        self.events.recv().await
    }

    /// Stop the subscription. A no-op if it has already ended.
    pub fn unsubscribe(self) -> Result<()> {
        match self.supervisor.upgrade() {
            Some(supervisor) => supervisor.unregister(&self.id),
            None => Ok(()),
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Build the decode-and-deliver callback for a subscription of `T` along
/// with the receiver it feeds.
///
/// A `next` payload is decoded as a `{data, errors}` document. GraphQL errors
/// inside it are passed to the subscriber as an `Err` item and the
/// subscription continues. A payload that does not decode, or a subscriber
/// that has gone away, fails the callback and ends the subscription.
pub(crate) fn channel<T>(capacity: usize) -> (Deliver, mpsc::Receiver<Result<T>>)
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let deliver: Deliver = Arc::new(move |delivery: Delivery| -> BoxFuture<'static, Result<()>> {
        let tx = tx.clone();
        Box::pin(async move {
            let item = match delivery {
                Delivery::Payload(payload) => {
                    match serde_json::from_value::<GraphqlResponse<T>>(payload) {
                        Ok(response) => response.into_result(),
                        Err(e) => {
                            let message = format!("cannot decode event: {}", e);
                            let _ = tx.send(Err(SdkError::Delivery(message.clone()))).await;
                            return Err(SdkError::Delivery(message));
                        }
                    }
                }
                Delivery::Failure(error) => Err(error),
            };
            tx.send(item)
                .await
                .map_err(|_| SdkError::Delivery("subscriber dropped".to_string()))
        })
    });
    (deliver, rx)
}
