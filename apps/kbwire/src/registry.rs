//! # Correlation Registry
//!
//! The two tables shared by callers and the inbound pump: pending calls keyed
//! by correlation id, and live subscriptions keyed by subscription id.
//!
//! Both live behind one mutex. It is held only while a table is mutated or
//! read, never across an await and never while a user callback runs.

use kbwire_core::requests::decode_subscription_ids;
use kbwire_core::{EventNotification, InboundEnvelope, KbError, SubscriptionId};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// Callback invoked by the pump for every notification of a subscription.
pub type EventCallback = Arc<dyn Fn(EventNotification) + Send + Sync>;

/// What to do when the reply for a correlation id arrives.
enum Continuation {
    Reply(oneshot::Sender<InboundEnvelope>),
    /// A subscribe call: install the callbacks for the acknowledged ids
    /// before waking the caller.
    Subscribe {
        tx: oneshot::Sender<InboundEnvelope>,
        callbacks: Vec<EventCallback>,
    },
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    pending: BTreeMap<u64, Continuation>,
    subscriptions: BTreeMap<SubscriptionId, EventCallback>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    tables: Mutex<Tables>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a correlation id and park a continuation under it.
    ///
    /// A non-empty `callbacks` marks a subscribe call.
    pub(crate) fn register(
        &self,
        callbacks: Vec<EventCallback>,
    ) -> Result<(u64, oneshot::Receiver<InboundEnvelope>), KbError> {
        let mut tables = self.lock();
        if tables.closed {
            return Err(KbError::Closed);
        }
        tables.next_id += 1;
        let id = tables.next_id;
        let (tx, rx) = oneshot::channel();
        let continuation = if callbacks.is_empty() {
            Continuation::Reply(tx)
        } else {
            Continuation::Subscribe { tx, callbacks }
        };
        tables.pending.insert(id, continuation);
        Ok((id, rx))
    }

    /// Hand a reply to its waiting caller. Returns false for a late or
    /// unknown correlation id.
    pub(crate) fn resolve(&self, reply: InboundEnvelope) -> bool {
        let mut tables = self.lock();
        let Some(continuation) = tables.pending.remove(&reply.id) else {
            return false;
        };
        let mut installed = Vec::new();
        let tx = match continuation {
            Continuation::Reply(tx) => tx,
            Continuation::Subscribe { tx, callbacks } => {
                if reply.status {
                    if let Ok(ids) = decode_subscription_ids(&reply.payload, callbacks.len()) {
                        installed.clone_from(&ids);
                        tables.subscriptions.extend(ids.into_iter().zip(callbacks));
                    }
                }
                tx
            }
        };
        drop(tables);
        if tx.send(reply).is_ok() {
            return true;
        }
        // Nobody is left to hold a handle for these.
        self.remove_subscriptions(&installed);
        false
    }

    /// Forget a pending call. Returns false when it was already resolved
    /// or never registered.
    pub(crate) fn cancel(&self, id: u64) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    pub(crate) fn subscription(&self, id: SubscriptionId) -> Option<EventCallback> {
        self.lock().subscriptions.get(&id).cloned()
    }

    pub(crate) fn remove_subscriptions(&self, ids: &[SubscriptionId]) {
        let mut tables = self.lock();
        for id in ids {
            tables.subscriptions.remove(id);
        }
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub(crate) fn subscription_len(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Refuse further calls, drop every continuation (waking callers with
    /// a closed channel) and clear the subscription table.
    pub(crate) fn close(&self) {
        let (pending, subscriptions) = {
            let mut tables = self.lock();
            tables.closed = true;
            (
                std::mem::take(&mut tables.pending),
                std::mem::take(&mut tables.subscriptions),
            )
        };
        drop(pending);
        drop(subscriptions);
    }
}
