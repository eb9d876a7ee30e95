//! # Core Type Definitions
//!
//! Address space and error taxonomy shared by every kbwire module:
//! - Element identifiers (`Addr`)
//! - Element type bitmasks (`ElementType`, `ElementKind`)
//! - Error types (`KbError`)
//!
//! ## Type Mask Layout
//!
//! Mask bits fall into mutually exclusive groups: kind (node / link / edge),
//! constancy (const / var), polarity (pos / neg / fuzzy) and permanence
//! (temp / perm). Node subkinds reuse the polarity and permanence bits, so
//! predicates test group membership, never raw equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ADDRESS
// =============================================================================

/// Opaque identifier of a graph element in the store.
///
/// Zero is the universal "invalid / absent" sentinel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Addr(pub u64);

impl Addr {
    /// The invalid address.
    pub const INVALID: Self = Self(0);

    /// Create an address from a raw identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// An address is valid when it is nonzero.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// =============================================================================
// ELEMENT TYPE
// =============================================================================

/// Structural kind of a graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementKind {
    Node,
    Edge,
    Link,
}

/// Bitmask describing the category of a graph element.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ElementType(pub u32);

impl ElementType {
    /// No constraint at all; matches any element in templates.
    pub const UNKNOWN: Self = Self(0);

    pub const NODE: Self = Self(0x1);
    pub const LINK: Self = Self(0x2);
    pub const UEDGE_COMMON: Self = Self(0x4);
    pub const DEDGE_COMMON: Self = Self(0x8);
    pub const EDGE_ACCESS: Self = Self(0x10);

    pub const CONST: Self = Self(0x20);
    pub const VAR: Self = Self(0x40);

    pub const EDGE_POS: Self = Self(0x80);
    pub const EDGE_NEG: Self = Self(0x100);
    pub const EDGE_FUZ: Self = Self(0x200);
    pub const EDGE_TEMP: Self = Self(0x400);
    pub const EDGE_PERM: Self = Self(0x800);

    pub const NODE_TUPLE: Self = Self(0x80);
    pub const NODE_STRUCT: Self = Self(0x100);
    pub const NODE_ROLE: Self = Self(0x200);
    pub const NODE_NO_ROLE: Self = Self(0x400);
    pub const NODE_CLASS: Self = Self(0x800);
    pub const NODE_ABSTRACT: Self = Self(0x1000);
    pub const NODE_MATERIAL: Self = Self(0x2000);

    pub const NODE_CONST: Self = Self(0x1 | 0x20);
    pub const NODE_VAR: Self = Self(0x1 | 0x40);
    pub const LINK_CONST: Self = Self(0x2 | 0x20);
    pub const LINK_VAR: Self = Self(0x2 | 0x40);
    pub const NODE_CONST_CLASS: Self = Self(0x1 | 0x20 | 0x800);
    pub const NODE_CONST_ROLE: Self = Self(0x1 | 0x20 | 0x200);
    pub const NODE_CONST_NO_ROLE: Self = Self(0x1 | 0x20 | 0x400);
    pub const DEDGE_COMMON_CONST: Self = Self(0x8 | 0x20);
    pub const DEDGE_COMMON_VAR: Self = Self(0x8 | 0x40);
    pub const ARC_POS_CONST_PERM: Self = Self(0x10 | 0x20 | 0x80 | 0x800);
    pub const ARC_POS_VAR_PERM: Self = Self(0x10 | 0x40 | 0x80 | 0x800);

    const EDGE_MASK: u32 = 0x4 | 0x8 | 0x10;

    /// Raw mask value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_node(self) -> bool {
        self.0 & Self::NODE.0 != 0
    }

    #[must_use]
    pub const fn is_edge(self) -> bool {
        self.0 & Self::EDGE_MASK != 0
    }

    #[must_use]
    pub const fn is_link(self) -> bool {
        self.0 & Self::LINK.0 != 0
    }

    #[must_use]
    pub const fn is_const(self) -> bool {
        self.0 & Self::CONST.0 != 0
    }

    #[must_use]
    pub const fn is_var(self) -> bool {
        self.0 & Self::VAR.0 != 0
    }

    /// Nonzero masks are valid.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The single kind this mask describes, or `None` when no kind bit or
    /// bits from more than one kind group are set.
    #[must_use]
    pub const fn kind(self) -> Option<ElementKind> {
        match (self.is_node(), self.is_edge(), self.is_link()) {
            (true, false, false) => Some(ElementKind::Node),
            (false, true, false) => Some(ElementKind::Edge),
            (false, false, true) => Some(ElementKind::Link),
            _ => None,
        }
    }

    /// A mask is well formed when at most one kind group is populated and
    /// const/var are not both set.
    #[must_use]
    pub const fn is_well_formed(self) -> bool {
        let kinds = self.is_node() as u8 + self.is_edge() as u8 + self.is_link() as u8;
        kinds <= 1 && !(self.is_const() && self.is_var())
    }

    /// True when every bit of `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ElementType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by kbwire.
///
/// `Timeout` and `RemoteRejected` are deliberately distinct: only the latter
/// means the store made and communicated a decision. A timeout is an unknown
/// outcome.
#[derive(Debug, Error)]
pub enum KbError {
    /// Malformed local input, detected before any network interaction.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No reply arrived within the call window.
    #[error("Timeout: no reply to '{kind}' within {after_ms} ms")]
    Timeout { kind: String, after_ms: u64 },

    /// The store replied with a failure status.
    #[error("Rejected by store: '{kind}' failed{}", reason_suffix(.reason))]
    RemoteRejected {
        kind: String,
        reason: Option<String>,
    },

    /// The transport failed; a background reconnect is in progress.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// An inbound record could not be interpreted.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The outbound queue is full.
    #[error("Outbound queue full ({capacity} pending records)")]
    QueueFull { capacity: usize },

    /// The connection manager was closed by its owner.
    #[error("Connection closed")]
    Closed,

    /// A record could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

impl KbError {
    /// Shorthand for `InvalidParameter`.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Shorthand for `ProtocolViolation`.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

impl From<serde_json::Error> for KbError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
