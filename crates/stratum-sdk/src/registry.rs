// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscription registry.
//!
//! Maps transport-assigned subscription ids to delivery callbacks. The map is
//! written by callers (register/unregister) and read by the supervisor task
//! (dispatch), so it sits behind a lock. Callbacks are cloned out of the lock
//! before they run; no lock is ever held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use stratum_protocol::{Inbound, ServerMessage};
use tracing::{debug, warn};

use crate::backend::SubscriptionId;
use crate::error::{Result, SdkError};
use crate::graphql::GraphqlError;

/// What the registry hands to a subscription's callback.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// Raw `next` payload, to be decoded by the callback.
    Payload(Value),
    /// A server-side or protocol fault attributed to this subscription.
    Failure(SdkError),
}

/// Decode-and-deliver callback. An `Err` ends the subscription.
pub(crate) type Deliver = Arc<dyn Fn(Delivery) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Outcome of dispatching one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Handed to a live subscription.
    Delivered,
    /// The callback failed; the subscription was removed locally and the
    /// server should be told to stop.
    Terminated(SubscriptionId),
    /// The server ended the subscription (`error` or `complete`).
    Finished(SubscriptionId),
    /// Unknown id or unattributable frame.
    Dropped,
    /// Not a subscription frame.
    Ignored,
}

/// Diagnostic view of one registered subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub created_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub events_delivered: u64,
}

struct Entry {
    payload: Value,
    deliver: Deliver,
    created_at: DateTime<Utc>,
    last_event_at: Option<DateTime<Utc>>,
    events_delivered: u64,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a subscription. Ids must be unique.
    pub(crate) fn insert(&self, id: SubscriptionId, payload: Value, deliver: Deliver) -> Result<()> {
        let mut entries = self.write();
        if entries.contains_key(&id) {
            return Err(SdkError::Protocol(format!(
                "subscription id {} is already registered",
                id
            )));
        }
        entries.insert(
            id,
            Entry {
                payload,
                deliver,
                created_at: Utc::now(),
                last_event_at: None,
                events_delivered: 0,
            },
        );
        Ok(())
    }

    /// Remove a subscription, dropping its callback. Returns whether it existed.
    pub(crate) fn remove(&self, id: &SubscriptionId) -> bool {
        self.write().remove(id).is_some()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &SubscriptionId) -> bool {
        self.read().contains_key(id)
    }

    /// Subscribe payload recorded for `id`.
    pub(crate) fn payload(&self, id: &SubscriptionId) -> Option<Value> {
        self.read().get(id).map(|entry| entry.payload.clone())
    }

    /// Every registered subscription with its payload, oldest first.
    pub(crate) fn requests(&self) -> Vec<(SubscriptionId, Value)> {
        let entries = self.read();
        let mut requests: Vec<_> = entries
            .iter()
            .map(|(id, entry)| (entry.created_at, id.clone(), entry.payload.clone()))
            .collect();
        requests.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        requests
            .into_iter()
            .map(|(_, id, payload)| (id, payload))
            .collect()
    }

    pub(crate) fn info(&self) -> Vec<SubscriptionInfo> {
        let entries = self.read();
        let mut info: Vec<_> = entries
            .iter()
            .map(|(id, entry)| SubscriptionInfo {
                id: id.clone(),
                created_at: entry.created_at,
                last_event_at: entry.last_event_at,
                events_delivered: entry.events_delivered,
            })
            .collect();
        info.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        info
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every registration, closing all event channels.
    pub(crate) fn clear(&self) {
        let drained: Vec<Entry> = self.write().drain().map(|(_, entry)| entry).collect();
        debug!(count = drained.len(), "subscription registry cleared");
    }

    fn callback(&self, id: &SubscriptionId) -> Option<Deliver> {
        self.read().get(id).map(|entry| entry.deliver.clone())
    }

    fn record_event(&self, id: &SubscriptionId) {
        if let Some(entry) = self.write().get_mut(id) {
            entry.events_delivered += 1;
            entry.last_event_at = Some(Utc::now());
        }
    }

    /// Route one inbound frame to its subscription.
    pub(crate) async fn dispatch(&self, inbound: Inbound) -> Dispatch {
        match inbound {
            Inbound::Message(ServerMessage::Next { id, payload }) => {
                let id = SubscriptionId::from(id);
                let Some(deliver) = self.callback(&id) else {
                    debug!(subscription_id = %id, "event for unknown subscription dropped");
                    return Dispatch::Dropped;
                };
                match deliver(Delivery::Payload(payload)).await {
                    Ok(()) => {
                        self.record_event(&id);
                        Dispatch::Delivered
                    }
                    Err(error) => {
                        warn!(subscription_id = %id, error = %error, "delivery failed, ending subscription");
                        self.remove(&id);
                        Dispatch::Terminated(id)
                    }
                }
            }
            Inbound::Message(ServerMessage::Error { id, payload }) => {
                let id = SubscriptionId::from(id);
                let Some(deliver) = self.callback(&id) else {
                    debug!(subscription_id = %id, "error for unknown subscription dropped");
                    return Dispatch::Dropped;
                };
                let errors = graphql_errors(payload);
                warn!(subscription_id = %id, errors = errors.len(), "server ended subscription with errors");
                // The subscription is over either way.
                let _ = deliver(Delivery::Failure(SdkError::Server { errors })).await;
                self.remove(&id);
                Dispatch::Finished(id)
            }
            Inbound::Message(ServerMessage::Complete { id }) => {
                let id = SubscriptionId::from(id);
                if self.remove(&id) {
                    debug!(subscription_id = %id, "server completed subscription");
                    Dispatch::Finished(id)
                } else {
                    Dispatch::Dropped
                }
            }
            Inbound::Message(other) => {
                debug!(message = ?other, "ignoring non-subscription frame");
                Dispatch::Ignored
            }
            Inbound::Malformed {
                subscription_id: Some(id),
                error,
            } => {
                let id = SubscriptionId::from(id);
                let Some(deliver) = self.callback(&id) else {
                    debug!(subscription_id = %id, "malformed frame for unknown subscription dropped");
                    return Dispatch::Dropped;
                };
                match deliver(Delivery::Failure(SdkError::Protocol(error.to_string()))).await {
                    Ok(()) => Dispatch::Delivered,
                    Err(error) => {
                        warn!(subscription_id = %id, error = %error, "delivery failed, ending subscription");
                        self.remove(&id);
                        Dispatch::Terminated(id)
                    }
                }
            }
            Inbound::Malformed {
                subscription_id: None,
                error,
            } => {
                warn!(error = %error, "dropping unattributable frame");
                Dispatch::Dropped
            }
        }
    }
}

/// Error payloads are normally a list of GraphQL errors; anything else is
/// wrapped as a single error carrying the raw JSON.
fn graphql_errors(payload: Value) -> Vec<GraphqlError> {
    match serde_json::from_value::<Vec<GraphqlError>>(payload.clone()) {
        Ok(errors) => errors,
        Err(_) => match serde_json::from_value::<GraphqlError>(payload.clone()) {
            Ok(error) => vec![error],
            Err(_) => vec![GraphqlError::new(payload.to_string())],
        },
    }
}
