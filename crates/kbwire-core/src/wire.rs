//! # Wire Records
//!
//! Logical record shapes exchanged with the store and the record codec.
//!
//! One record is one JSON document. Framing (how records are delimited on
//! the transport) belongs to the transport, not to this module.

use crate::KbError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds of request the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    CheckElements,
    CreateElements,
    DeleteElements,
    Content,
    Keynodes,
    SearchTemplate,
    GenerateTemplate,
    Events,
}

impl RequestKind {
    /// Wire name of the request kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckElements => "check_elements",
            Self::CreateElements => "create_elements",
            Self::DeleteElements => "delete_elements",
            Self::Content => "content",
            Self::Keynodes => "keynodes",
            Self::SearchTemplate => "search_template",
            Self::GenerateTemplate => "generate_template",
            Self::Events => "events",
        }
    }
}

/// Client → store record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    /// Correlation id.
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl OutboundEnvelope {
    #[must_use]
    pub fn new(id: u64, kind: RequestKind, payload: Value) -> Self {
        Self {
            id,
            kind: kind.as_str().to_string(),
            payload,
        }
    }
}

/// Store → client record.
///
/// `id` is a correlation id for replies and a subscription id for event pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub id: u64,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub event: bool,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEnvelope {
    /// Build a reply record.
    #[must_use]
    pub fn reply(id: u64, status: bool, payload: Value) -> Self {
        Self {
            id,
            status,
            event: false,
            payload,
        }
    }

    /// Build an event-push record.
    #[must_use]
    pub fn event(subscription: u64, payload: Value) -> Self {
        Self {
            id: subscription,
            status: true,
            event: true,
            payload,
        }
    }

    /// Failure reason carried by a rejected reply, when the store sent one.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match &self.payload {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(map) => map
                .get("message")
                .or_else(|| map.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        }
    }
}

/// Serialize one record.
pub fn encode_record<T: Serialize>(record: &T) -> Result<String, KbError> {
    serde_json::to_string(record).map_err(KbError::from)
}

/// Deserialize one inbound record.
///
/// Anything that does not parse as an inbound envelope is a protocol violation.
pub fn decode_record(raw: &str) -> Result<InboundEnvelope, KbError> {
    serde_json::from_str(raw.trim_end())
        .map_err(|e| KbError::protocol(format!("unparseable inbound record: {e}")))
}
