//! # Events
//!
//! Event kinds the store can be subscribed to and the decoded form of an
//! event-push record.

use crate::constants::EVENT_PAYLOAD_ARITY;
use crate::{Addr, KbError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Store-assigned subscription identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    /// Subscription ids handed out by the store are strictly positive.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural change that triggers an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Unknown,
    AddOutgoingEdge,
    AddIngoingEdge,
    RemoveOutgoingEdge,
    RemoveIngoingEdge,
    #[serde(rename = "delete_element")]
    RemoveElement,
    #[serde(rename = "content_change")]
    ChangeContent,
}

impl EventType {
    /// Wire name of the event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::AddOutgoingEdge => "add_outgoing_edge",
            Self::AddIngoingEdge => "add_ingoing_edge",
            Self::RemoveOutgoingEdge => "remove_outgoing_edge",
            Self::RemoveIngoingEdge => "remove_ingoing_edge",
            Self::RemoveElement => "delete_element",
            Self::ChangeContent => "content_change",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Unknown,
            Self::AddOutgoingEdge,
            Self::AddIngoingEdge,
            Self::RemoveOutgoingEdge,
            Self::RemoveIngoingEdge,
            Self::RemoveElement,
            Self::ChangeContent,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
        .ok_or_else(|| KbError::invalid(format!("unknown event type '{s}'")))
    }
}

/// One decoded event push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventNotification {
    pub subscription: SubscriptionId,
    /// Element the subscription is attached to.
    pub element: Addr,
    /// Edge whose appearance or removal triggered the event.
    pub edge: Addr,
    /// The other endpoint of `edge`.
    pub other: Addr,
}

impl EventNotification {
    /// Decode the `[element, edge, other]` payload of an event push.
    pub fn from_payload(subscription: SubscriptionId, payload: &Value) -> Result<Self, KbError> {
        let items = payload
            .as_array()
            .ok_or_else(|| KbError::protocol("event payload is not an array"))?;
        if items.len() != EVENT_PAYLOAD_ARITY {
            return Err(KbError::protocol(format!(
                "event payload has {} entries, expected {}",
                items.len(),
                EVENT_PAYLOAD_ARITY
            )));
        }
        let addr = |i: usize| {
            items[i]
                .as_u64()
                .map(Addr)
                .ok_or_else(|| KbError::protocol(format!("event payload entry {i} is not an id")))
        };
        Ok(Self {
            subscription,
            element: addr(0)?,
            edge: addr(1)?,
            other: addr(2)?,
        })
    }
}
