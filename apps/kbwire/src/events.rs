//! # Event Router
//!
//! Store-side subscriptions and delivery of their notifications.
//!
//! Subscribing is an ordinary call; the callbacks become routable the moment
//! the acknowledgement is processed by the pump. Delivery is an exact lookup
//! by subscription id. Pushes for unknown ids are dropped.

use crate::dispatcher::RequestDispatcher;
use crate::registry::{EventCallback, Registry};
use kbwire_core::requests::{create_events, decode_subscription_ids, destroy_events};
use kbwire_core::{
    Addr, EventNotification, EventType, InboundEnvelope, KbError, RequestKind, SubscriptionId,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// A live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle {
    pub id: SubscriptionId,
    pub element: Addr,
    pub event_type: EventType,
}

/// One subscribe request: which element, which change, who to call.
pub struct EventRequest {
    pub element: Addr,
    pub event_type: EventType,
    pub callback: EventCallback,
}

impl EventRequest {
    pub fn new(
        element: Addr,
        event_type: EventType,
        callback: impl Fn(EventNotification) + Send + Sync + 'static,
    ) -> Self {
        Self {
            element,
            event_type,
            callback: Arc::new(callback),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventRouter {
    dispatcher: RequestDispatcher,
}

impl EventRouter {
    #[must_use]
    pub fn new(dispatcher: RequestDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Subscribe one callback.
    pub async fn subscribe(
        &self,
        element: Addr,
        event_type: EventType,
        callback: impl Fn(EventNotification) + Send + Sync + 'static,
    ) -> Result<EventHandle, KbError> {
        let mut handles = self
            .subscribe_batch(vec![EventRequest::new(element, event_type, callback)])
            .await?;
        handles
            .pop()
            .ok_or_else(|| KbError::protocol("events reply carried no subscription id"))
    }

    /// Subscribe several callbacks in one request. Handles come back in
    /// request order.
    pub async fn subscribe_batch(
        &self,
        requests: Vec<EventRequest>,
    ) -> Result<Vec<EventHandle>, KbError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let targets: Vec<(Addr, EventType)> = requests
            .iter()
            .map(|r| (r.element, r.event_type))
            .collect();
        let payload = create_events(&targets)?;
        let callbacks = requests.into_iter().map(|r| r.callback).collect();

        let reply = self
            .dispatcher
            .call_with(RequestKind::Events, payload, callbacks)
            .await?;
        let ids = decode_subscription_ids(&reply, targets.len())?;
        Ok(ids
            .into_iter()
            .zip(targets)
            .map(|(id, (element, event_type))| EventHandle {
                id,
                element,
                event_type,
            })
            .collect())
    }

    /// Destroy subscriptions.
    ///
    /// The remote request is best effort; the local entries are removed
    /// whatever its outcome, and its error (if any) is returned afterwards.
    /// A notification already in flight may still be delivered once.
    pub async fn unsubscribe(&self, handles: &[EventHandle]) -> Result<(), KbError> {
        if handles.is_empty() {
            return Ok(());
        }
        let ids: Vec<SubscriptionId> = handles.iter().map(|h| h.id).collect();
        let remote = self
            .dispatcher
            .call(RequestKind::Events, destroy_events(&ids))
            .await;
        self.dispatcher.connection().registry().remove_subscriptions(&ids);
        if let Err(e) = &remote {
            warn!(error = %e, count = ids.len(), "remote unsubscribe failed; removed locally");
        }
        remote.map(|_| ())
    }

    /// Number of locally routable subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.dispatcher.connection().registry().subscription_len()
    }
}

/// Deliver one event push to its subscriber, on the pump.
pub(crate) fn route_event(registry: &Registry, envelope: &InboundEnvelope) {
    let id = SubscriptionId(envelope.id);
    let Some(callback) = registry.subscription(id) else {
        debug!(subscription = envelope.id, "dropping event for unknown subscription");
        return;
    };
    match EventNotification::from_payload(id, &envelope.payload) {
        Ok(notification) => callback(notification),
        Err(e) => warn!(subscription = envelope.id, error = %e, "dropping malformed event"),
    }
}
