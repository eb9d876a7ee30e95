//! # Link Content
//!
//! Content carried by link elements and its wire representation.
//!
//! Binary content is transported base64-encoded inside the JSON record.

use crate::{Addr, KbError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

/// Payload of a link element.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkData {
    Int(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
}

impl LinkData {
    /// Wire name of the content type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Binary(_) => "binary",
        }
    }

    /// JSON value for the `data`/`content` field.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(v) => json!(v),
            Self::Float(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Binary(v) => json!(STANDARD.encode(v)),
        }
    }

    /// Decode a content value given its wire type name.
    ///
    /// Unknown type names are treated as strings.
    pub fn from_json(type_name: &str, value: &Value) -> Result<Self, KbError> {
        let mismatch =
            || KbError::protocol(format!("link value {value} is not of type '{type_name}'"));
        match type_name {
            "int" => value.as_i64().map(Self::Int).ok_or_else(mismatch),
            "float" => value.as_f64().map(Self::Float).ok_or_else(mismatch),
            "binary" => {
                let encoded = value.as_str().ok_or_else(mismatch)?;
                STANDARD
                    .decode(encoded)
                    .map(Self::Binary)
                    .map_err(|e| KbError::protocol(format!("binary link content: {e}")))
            }
            _ => Ok(Self::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
        }
    }
}

impl From<&str> for LinkData {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for LinkData {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for LinkData {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for LinkData {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Vec<u8>> for LinkData {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(v)
    }
}

/// Content of a link, optionally bound to the link's address.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkContent {
    pub data: LinkData,
    pub addr: Option<Addr>,
}

impl LinkContent {
    /// Content not yet bound to a link (used by constructions).
    #[must_use]
    pub fn new(data: impl Into<LinkData>) -> Self {
        Self {
            data: data.into(),
            addr: None,
        }
    }

    /// Content destined for an existing link.
    #[must_use]
    pub fn for_link(addr: Addr, data: impl Into<LinkData>) -> Self {
        Self {
            data: data.into(),
            addr: Some(addr),
        }
    }

    /// The target link address, required for set operations.
    pub fn target(&self) -> Result<Addr, KbError> {
        match self.addr {
            Some(addr) if addr.is_valid() => Ok(addr),
            Some(addr) => Err(KbError::invalid(format!(
                "link content targets invalid address {addr}"
            ))),
            None => Err(KbError::invalid("link content has no target address")),
        }
    }
}
