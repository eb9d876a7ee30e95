//! # kbwire-core
//!
//! Protocol logic for clients of a remote graph knowledge store - THE PROTOCOL.
//!
//! The store keeps every piece of data as a typed graph element (nodes,
//! edges, content-bearing links). This crate knows how to phrase requests
//! against it and how to read its replies; it never touches the network.
//!
//! ## Contents
//!
//! - `types`: addresses, element type masks, the error taxonomy
//! - `template`: triple patterns, their payload and match decoding
//! - `construction`: batched element creation with alias references
//! - `wire` / `requests`: envelopes and per-request payload codecs
//! - `link` / `event`: link content and event notifications
//!
//! ## Architectural Constraints
//!
//! - No async, no I/O: the runtime lives in the `kbwire` app crate
//! - Malformed local input is rejected here, before any record is sent

// =============================================================================
// MODULES
// =============================================================================

pub mod constants;
pub mod construction;
pub mod event;
pub mod link;
pub mod requests;
pub mod template;
pub mod types;
pub mod wire;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use types::{Addr, ElementKind, ElementType, KbError};

pub use construction::{Construction, ConstructionCommand, EdgeEnd};
pub use event::{EventNotification, EventType, SubscriptionId};
pub use link::{LinkContent, LinkData};
pub use template::{
    ResultKey, Template, TemplateItem, TemplateResult, TemplateTriple, TemplateValue,
};
pub use wire::{InboundEnvelope, OutboundEnvelope, RequestKind, decode_record, encode_record};
