//! # Construction Builder
//!
//! Batches of pending element creations, submitted to the store in one
//! request. Commands may refer to each other by alias; the store returns one
//! address per command, in command order, or rejects the whole batch.
//!
//! ## Alias Policy
//!
//! Binding an alias that is already bound silently rebinds it to the newer
//! command. Only the most recent binding is resolvable afterwards.

use crate::link::LinkData;
use crate::{Addr, ElementKind, ElementType, KbError};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Endpoint of an edge command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeEnd {
    /// An element that already exists in the store.
    Addr(Addr),
    /// Another command of the same construction, by alias.
    Alias(String),
}

impl From<Addr> for EdgeEnd {
    fn from(a: Addr) -> Self {
        Self::Addr(a)
    }
}

impl From<&str> for EdgeEnd {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

impl From<String> for EdgeEnd {
    fn from(alias: String) -> Self {
        Self::Alias(alias)
    }
}

/// One pending creation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstructionCommand {
    Node {
        element_type: ElementType,
    },
    Edge {
        element_type: ElementType,
        source: EdgeEnd,
        target: EdgeEnd,
    },
    Link {
        element_type: ElementType,
        content: LinkData,
    },
}

impl ConstructionCommand {
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Node { element_type }
            | Self::Edge { element_type, .. }
            | Self::Link { element_type, .. } => *element_type,
        }
    }
}

/// An ordered batch of creation commands plus its alias table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Construction {
    commands: Vec<ConstructionCommand>,
    aliases: BTreeMap<String, usize>,
}

impl Construction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a node creation.
    pub fn add_node(
        &mut self,
        element_type: ElementType,
        alias: Option<&str>,
    ) -> Result<&mut Self, KbError> {
        require_kind(element_type, ElementKind::Node)?;
        self.push(ConstructionCommand::Node { element_type }, alias)
    }

    /// Queue an edge creation between two existing or pending elements.
    pub fn add_edge(
        &mut self,
        element_type: ElementType,
        source: impl Into<EdgeEnd>,
        target: impl Into<EdgeEnd>,
        alias: Option<&str>,
    ) -> Result<&mut Self, KbError> {
        require_kind(element_type, ElementKind::Edge)?;
        self.push(
            ConstructionCommand::Edge {
                element_type,
                source: source.into(),
                target: target.into(),
            },
            alias,
        )
    }

    /// Queue a link creation carrying `content`.
    pub fn add_link(
        &mut self,
        element_type: ElementType,
        content: impl Into<LinkData>,
        alias: Option<&str>,
    ) -> Result<&mut Self, KbError> {
        require_kind(element_type, ElementKind::Link)?;
        self.push(
            ConstructionCommand::Link {
                element_type,
                content: content.into(),
            },
            alias,
        )
    }

    fn push(
        &mut self,
        command: ConstructionCommand,
        alias: Option<&str>,
    ) -> Result<&mut Self, KbError> {
        if let Some(alias) = alias {
            if alias.is_empty() {
                return Err(KbError::invalid("empty construction alias"));
            }
            self.aliases.insert(alias.to_string(), self.commands.len());
        }
        self.commands.push(command);
        Ok(self)
    }

    /// Position bound to `alias`.
    #[must_use]
    pub fn index_of(&self, alias: &str) -> Option<usize> {
        self.aliases.get(alias).copied()
    }

    #[must_use]
    pub fn commands(&self) -> &[ConstructionCommand] {
        &self.commands
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Wire payload for `create_elements`.
    ///
    /// Every alias endpoint must resolve; an unbound alias fails the whole
    /// construction before anything is sent.
    pub fn encode(&self) -> Result<Value, KbError> {
        self.commands
            .iter()
            .map(|cmd| match cmd {
                ConstructionCommand::Node { element_type } => Ok(json!({
                    "el": "node",
                    "type": element_type.0,
                })),
                ConstructionCommand::Edge {
                    element_type,
                    source,
                    target,
                } => Ok(json!({
                    "el": "edge",
                    "type": element_type.0,
                    "src": self.encode_end(source)?,
                    "trg": self.encode_end(target)?,
                })),
                ConstructionCommand::Link {
                    element_type,
                    content,
                } => Ok(json!({
                    "el": "link",
                    "type": element_type.0,
                    "content": content.to_json(),
                    "content_type": content.type_name(),
                })),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn encode_end(&self, end: &EdgeEnd) -> Result<Value, KbError> {
        match end {
            EdgeEnd::Addr(addr) => Ok(json!({"type": "addr", "value": addr.0})),
            EdgeEnd::Alias(alias) => self
                .index_of(alias)
                .map(|idx| json!({"type": "ref", "value": idx}))
                .ok_or_else(|| KbError::invalid(format!("unbound construction alias '{alias}'"))),
        }
    }
}

fn require_kind(element_type: ElementType, kind: ElementKind) -> Result<(), KbError> {
    if element_type.kind() == Some(kind) {
        Ok(())
    } else {
        Err(KbError::invalid(format!(
            "type {element_type} is not a {kind:?} type"
        )))
    }
}
