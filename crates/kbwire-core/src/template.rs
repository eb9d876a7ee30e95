//! # Template Codec
//!
//! Declarative triple patterns and their wire representation.
//!
//! A `Template` is an ordered list of `(source, edge, target)` triples. Each
//! slot is a `TemplateItem`: a literal address, a type constraint or a
//! reference to another slot's alias, optionally tagged with its own alias.
//! The order of triples is kept verbatim in the payload, which fixes the
//! flat offsets used to decode matches.
//!
//! ## Wire Shape
//!
//! ```text
//! [ [ {alias?, type: "addr"|"type"|"alias", value}, {..}, {..} ], ... ]
//! ```
//!
//! Search replies carry `{aliases: {name: offset}, addrs: [[id, ...], ...]}`;
//! generate replies carry a single flat `addrs` list.

use crate::constants::GENERATED_ALIAS_PREFIX;
use crate::{Addr, ElementType, KbError};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// SLOTS
// =============================================================================

/// Value of one template slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// A concrete element.
    Addr(Addr),
    /// Any element of this type.
    Type(ElementType),
    /// Whatever the slot with this alias binds to.
    AliasRef(String),
}

impl TemplateValue {
    fn wire_type(&self) -> &'static str {
        match self {
            Self::Addr(_) => "addr",
            Self::Type(_) => "type",
            Self::AliasRef(_) => "alias",
        }
    }

    fn wire_value(&self) -> Value {
        match self {
            Self::Addr(a) => json!(a.0),
            Self::Type(t) => json!(t.0),
            Self::AliasRef(name) => json!(name),
        }
    }
}

impl From<Addr> for TemplateValue {
    fn from(a: Addr) -> Self {
        Self::Addr(a)
    }
}

impl From<ElementType> for TemplateValue {
    fn from(t: ElementType) -> Self {
        Self::Type(t)
    }
}

/// One template slot: a value plus an optional alias naming its binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateItem {
    pub value: TemplateValue,
    pub alias: Option<String>,
}

impl TemplateItem {
    /// A slot whose binding can later be fetched by `alias`.
    ///
    /// Only addresses and types can be aliased; an alias reference already
    /// names another slot.
    pub fn named(
        value: impl Into<TemplateValue>,
        alias: impl Into<String>,
    ) -> Result<Self, KbError> {
        let value = value.into();
        let alias = alias.into();
        if let TemplateValue::AliasRef(name) = &value {
            return Err(KbError::invalid(format!(
                "alias reference '{name}' cannot itself carry alias '{alias}'"
            )));
        }
        check_explicit_alias(&alias)?;
        Ok(Self {
            value,
            alias: Some(alias),
        })
    }

    /// A reference to the slot aliased `name`.
    #[must_use]
    pub fn alias_ref(name: impl Into<String>) -> Self {
        Self {
            value: TemplateValue::AliasRef(name.into()),
            alias: None,
        }
    }

    fn validate(&self) -> Result<(), KbError> {
        if let Some(alias) = &self.alias {
            if matches!(self.value, TemplateValue::AliasRef(_)) {
                return Err(KbError::invalid(format!(
                    "alias reference cannot carry alias '{alias}'"
                )));
            }
            check_explicit_alias(alias)?;
        }
        match &self.value {
            TemplateValue::AliasRef(name) => check_explicit_alias(name),
            TemplateValue::Addr(_) | TemplateValue::Type(_) => Ok(()),
        }
    }

    fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(alias) = &self.alias {
            obj.insert("alias".into(), json!(alias));
        }
        obj.insert("type".into(), json!(self.value.wire_type()));
        obj.insert("value".into(), self.value.wire_value());
        Value::Object(obj)
    }
}

impl From<Addr> for TemplateItem {
    fn from(a: Addr) -> Self {
        Self {
            value: TemplateValue::Addr(a),
            alias: None,
        }
    }
}

impl From<ElementType> for TemplateItem {
    fn from(t: ElementType) -> Self {
        Self {
            value: TemplateValue::Type(t),
            alias: None,
        }
    }
}

impl From<&str> for TemplateItem {
    fn from(name: &str) -> Self {
        Self::alias_ref(name)
    }
}

impl From<String> for TemplateItem {
    fn from(name: String) -> Self {
        Self::alias_ref(name)
    }
}

fn check_explicit_alias(alias: &str) -> Result<(), KbError> {
    if alias.is_empty() {
        return Err(KbError::invalid("empty template alias"));
    }
    if alias.starts_with(GENERATED_ALIAS_PREFIX) {
        return Err(KbError::invalid(format!(
            "alias '{alias}' uses the reserved prefix '{GENERATED_ALIAS_PREFIX}'"
        )));
    }
    Ok(())
}

// =============================================================================
// TEMPLATE
// =============================================================================

/// A `(source, edge, target)` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateTriple {
    pub source: TemplateItem,
    pub edge: TemplateItem,
    pub target: TemplateItem,
}

/// An ordered set of triple constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    triples: Vec<TemplateTriple>,
    generated_aliases: u32,
}

impl Template {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one triple.
    pub fn triple(
        &mut self,
        source: impl Into<TemplateItem>,
        edge: impl Into<TemplateItem>,
        target: impl Into<TemplateItem>,
    ) -> Result<&mut Self, KbError> {
        let triple = TemplateTriple {
            source: source.into(),
            edge: edge.into(),
            target: target.into(),
        };
        triple.source.validate()?;
        triple.edge.validate()?;
        triple.target.validate()?;
        self.triples.push(triple);
        Ok(self)
    }

    /// Append `member --edge--> value` plus a triple asserting that
    /// `relation_target --relation_type--> edge`.
    ///
    /// The shared edge keeps the caller's alias when it has one; otherwise a
    /// fresh alias from the reserved namespace is generated.
    pub fn triple_with_relation(
        &mut self,
        member: impl Into<TemplateItem>,
        edge: impl Into<TemplateItem>,
        value: impl Into<TemplateItem>,
        relation_type: impl Into<TemplateItem>,
        relation_target: impl Into<TemplateItem>,
    ) -> Result<&mut Self, KbError> {
        let mut edge = edge.into();
        if matches!(edge.value, TemplateValue::AliasRef(_)) {
            return Err(KbError::invalid(
                "relation edge must be an address or a type, not an alias reference",
            ));
        }
        edge.validate()?;
        let alias = match &edge.alias {
            Some(alias) => alias.clone(),
            None => {
                self.generated_aliases += 1;
                let generated = format!("{GENERATED_ALIAS_PREFIX}{}", self.generated_aliases);
                edge.alias = Some(generated.clone());
                generated
            }
        };

        let first = TemplateTriple {
            source: member.into(),
            edge,
            target: value.into(),
        };
        let second = TemplateTriple {
            source: relation_target.into(),
            edge: relation_type.into(),
            target: TemplateItem::alias_ref(alias),
        };
        first.source.validate()?;
        first.target.validate()?;
        second.source.validate()?;
        second.edge.validate()?;

        self.triples.push(first);
        self.triples.push(second);
        Ok(self)
    }

    #[must_use]
    pub fn triples(&self) -> &[TemplateTriple] {
        &self.triples
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Alias → flat offset (`3 * triple + slot`) of the first slot carrying it.
    #[must_use]
    pub fn alias_offsets(&self) -> BTreeMap<String, usize> {
        let mut offsets = BTreeMap::new();
        for (i, t) in self.triples.iter().enumerate() {
            for (j, item) in [&t.source, &t.edge, &t.target].into_iter().enumerate() {
                if let Some(alias) = &item.alias {
                    offsets.entry(alias.clone()).or_insert(i * 3 + j);
                }
            }
        }
        offsets
    }

    /// Wire payload for search and generate requests.
    #[must_use]
    pub fn encode(&self) -> Value {
        Value::Array(
            self.triples
                .iter()
                .map(|t| json!([t.source.to_json(), t.edge.to_json(), t.target.to_json()]))
                .collect(),
        )
    }

    /// Decode a search reply into one result per match.
    pub fn decode_search(&self, payload: &Value) -> Result<Vec<TemplateResult>, KbError> {
        let aliases = Arc::new(self.reply_aliases(payload)?);
        let matches = payload
            .get("addrs")
            .and_then(Value::as_array)
            .ok_or_else(|| KbError::protocol("search reply has no 'addrs' array"))?;
        matches
            .iter()
            .map(|m| {
                Ok(TemplateResult {
                    addrs: decode_addr_list(m)?,
                    aliases: Arc::clone(&aliases),
                })
            })
            .collect()
    }

    /// Decode a generate reply into its single result.
    pub fn decode_generated(&self, payload: &Value) -> Result<TemplateResult, KbError> {
        let aliases = Arc::new(self.reply_aliases(payload)?);
        let addrs = payload
            .get("addrs")
            .ok_or_else(|| KbError::protocol("generate reply has no 'addrs' array"))?;
        Ok(TemplateResult {
            addrs: decode_addr_list(addrs)?,
            aliases,
        })
    }

    fn reply_aliases(&self, payload: &Value) -> Result<BTreeMap<String, usize>, KbError> {
        match payload.get("aliases") {
            None | Some(Value::Null) => Ok(self.alias_offsets()),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(name, offset)| {
                    offset
                        .as_u64()
                        .map(|o| (name.clone(), o as usize))
                        .ok_or_else(|| {
                            KbError::protocol(format!("alias '{name}' has non-integer offset"))
                        })
                })
                .collect(),
            Some(other) => Err(KbError::protocol(format!(
                "reply alias table is not an object: {other}"
            ))),
        }
    }
}

/// Decode a JSON array of element ids.
pub(crate) fn decode_addr_list(value: &Value) -> Result<Vec<Addr>, KbError> {
    value
        .as_array()
        .ok_or_else(|| KbError::protocol(format!("expected an id array, got {value}")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(Addr)
                .ok_or_else(|| KbError::protocol(format!("'{v}' is not an element id")))
        })
        .collect()
}

// =============================================================================
// RESULTS
// =============================================================================

/// Key used to fetch a bound address out of a `TemplateResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKey<'a> {
    Alias(&'a str),
    Offset(usize),
}

impl<'a> From<&'a str> for ResultKey<'a> {
    fn from(alias: &'a str) -> Self {
        Self::Alias(alias)
    }
}

impl From<usize> for ResultKey<'_> {
    fn from(offset: usize) -> Self {
        Self::Offset(offset)
    }
}

/// One match: the flat list of bound addresses plus the alias table shared
/// by every match of the same reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateResult {
    addrs: Vec<Addr>,
    aliases: Arc<BTreeMap<String, usize>>,
}

impl TemplateResult {
    /// Fetch a bound address by alias or by flat offset.
    pub fn get<'a>(&self, key: impl Into<ResultKey<'a>>) -> Result<Addr, KbError> {
        let offset = match key.into() {
            ResultKey::Alias(alias) => *self
                .aliases
                .get(alias)
                .ok_or_else(|| KbError::invalid(format!("alias '{alias}' is not in the result")))?,
            ResultKey::Offset(offset) => offset,
        };
        self.addrs.get(offset).copied().ok_or_else(|| {
            KbError::invalid(format!(
                "offset {offset} out of range for result of {} addresses",
                self.addrs.len()
            ))
        })
    }

    /// Offset recorded for `alias`, if any.
    #[must_use]
    pub fn offset_of(&self, alias: &str) -> Option<usize> {
        self.aliases.get(alias).copied()
    }

    #[must_use]
    pub fn addrs(&self) -> &[Addr] {
        &self.addrs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Iterate the match as `(source, edge, target)` triples.
    pub fn triples(&self) -> impl Iterator<Item = (Addr, Addr, Addr)> + '_ {
        self.addrs.chunks_exact(3).map(|c| (c[0], c[1], c[2]))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn named(value: impl Into<TemplateValue>, alias: &str) -> TemplateItem {
        TemplateItem::named(value, alias).expect("named")
    }

    #[test]
    fn slot_kind_follows_value_variant() {
        let mut t = Template::new();
        t.triple(
            Addr(5),
            named(ElementType::ARC_POS_VAR_PERM, "_edge"),
            "_item",
        )
        .expect("triple");

        let payload = t.encode();
        assert_eq!(
            payload,
            json!([[
                {"type": "addr", "value": 5},
                {"alias": "_edge", "type": "type", "value": ElementType::ARC_POS_VAR_PERM.0},
                {"type": "alias", "value": "_item"},
            ]])
        );
    }

    #[test]
    fn alias_offsets_use_first_occurrence() {
        let mut t = Template::new();
        t.triple(
            named(Addr(1), "a"),
            ElementType::ARC_POS_VAR_PERM,
            named(ElementType::NODE_VAR, "b"),
        )
        .expect("triple");
        t.triple("b", named(ElementType::ARC_POS_VAR_PERM, "e"), named(Addr(2), "a"))
            .expect("triple");

        let offsets = t.alias_offsets();
        assert_eq!(offsets.get("a"), Some(&0));
        assert_eq!(offsets.get("b"), Some(&2));
        assert_eq!(offsets.get("e"), Some(&4));
    }

    #[test]
    fn aliasing_an_alias_reference_is_rejected() {
        let result = TemplateItem::named(TemplateValue::AliasRef("x".into()), "y");
        assert!(matches!(result, Err(KbError::InvalidParameter(_))));
    }

    #[test]
    fn reserved_prefix_is_rejected_for_explicit_aliases() {
        let alias = format!("{GENERATED_ALIAS_PREFIX}1");
        assert!(TemplateItem::named(Addr(1), alias.as_str()).is_err());

        let mut t = Template::new();
        assert!(t.triple(Addr(1), ElementType::ARC_POS_VAR_PERM, alias.as_str()).is_err());
        assert!(t.is_empty());
    }

    #[test]
    fn relation_expands_into_two_triples() {
        let mut t = Template::new();
        t.triple_with_relation(
            Addr(10),
            ElementType::DEDGE_COMMON_VAR,
            named(ElementType::LINK_VAR, "_name"),
            ElementType::ARC_POS_VAR_PERM,
            Addr(20),
        )
        .expect("relation");

        assert_eq!(t.len(), 2);
        let edge_alias = t.triples()[0].edge.alias.clone().expect("generated alias");
        assert!(edge_alias.starts_with(GENERATED_ALIAS_PREFIX));
        assert_eq!(t.triples()[1].source, TemplateItem::from(Addr(20)));
        assert_eq!(t.triples()[1].target, TemplateItem::alias_ref(edge_alias));
    }

    #[test]
    fn relation_keeps_caller_alias() {
        let mut t = Template::new();
        t.triple_with_relation(
            Addr(10),
            named(ElementType::DEDGE_COMMON_VAR, "rel"),
            ElementType::LINK_VAR,
            ElementType::ARC_POS_VAR_PERM,
            Addr(20),
        )
        .expect("relation");
        assert_eq!(t.triples()[1].target, TemplateItem::alias_ref("rel"));
    }

    #[test]
    fn relation_generated_aliases_differ() {
        let mut t = Template::new();
        for _ in 0..2 {
            t.triple_with_relation(
                Addr(10),
                ElementType::DEDGE_COMMON_VAR,
                ElementType::LINK_VAR,
                ElementType::ARC_POS_VAR_PERM,
                Addr(20),
            )
            .expect("relation");
        }
        let first = t.triples()[0].edge.alias.clone();
        let second = t.triples()[2].edge.alias.clone();
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn relation_edge_cannot_be_alias_reference() {
        let mut t = Template::new();
        let result = t.triple_with_relation(
            Addr(1),
            "edge",
            Addr(2),
            ElementType::ARC_POS_VAR_PERM,
            Addr(3),
        );
        assert!(matches!(result, Err(KbError::InvalidParameter(_))));
    }

    #[test]
    fn search_reply_shares_alias_table() {
        let mut t = Template::new();
        t.triple(
            Addr(1),
            named(ElementType::ARC_POS_VAR_PERM, "_edge"),
            named(ElementType::UNKNOWN, "_item"),
        )
        .expect("triple");

        let reply = json!({
            "aliases": {"_edge": 1, "_item": 2},
            "addrs": [[1, 100, 200], [1, 101, 201]],
        });
        let results = t.decode_search(&reply).expect("decode");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].get("_edge").expect("edge"), Addr(101));
        assert_eq!(results[1].get(2).expect("item"), Addr(201));
        assert_eq!(results[0].triples().collect::<Vec<_>>(), vec![(Addr(1), Addr(100), Addr(200))]);
    }

    #[test]
    fn missing_alias_is_an_error() {
        let t = Template::new();
        let result = t
            .decode_generated(&json!({"aliases": {}, "addrs": [1, 2, 3]}))
            .expect("decode");
        assert!(matches!(result.get("nope"), Err(KbError::InvalidParameter(_))));
        assert!(matches!(result.get(3), Err(KbError::InvalidParameter(_))));
    }

    #[test]
    fn reply_without_alias_table_uses_encoded_offsets() {
        let mut t = Template::new();
        t.triple(Addr(1), named(ElementType::ARC_POS_VAR_PERM, "_edge"), Addr(2))
            .expect("triple");
        let result = t.decode_generated(&json!({"addrs": [1, 7, 2]})).expect("decode");
        assert_eq!(result.get("_edge").expect("edge"), Addr(7));
    }

    #[test]
    fn malformed_reply_is_protocol_violation() {
        let t = Template::new();
        assert!(matches!(
            t.decode_search(&json!({"addrs": [[1, "x", 3]]})),
            Err(KbError::ProtocolViolation(_))
        ));
        assert!(matches!(
            t.decode_search(&json!({"aliases": []})),
            Err(KbError::ProtocolViolation(_))
        ));
    }
}
