//! # Request Payloads
//!
//! Payload builders and reply decoders for every request kind the client
//! issues. Builders validate local input; decoders turn a successful reply
//! payload into typed values and report malformed replies as protocol
//! violations.

use crate::event::{EventType, SubscriptionId};
use crate::link::{LinkContent, LinkData};
use crate::template::decode_addr_list;
use crate::{Addr, ElementType, KbError};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

// =============================================================================
// ELEMENTS
// =============================================================================

/// Payload listing raw element ids (check / delete).
#[must_use]
pub fn addr_list(addrs: &[Addr]) -> Value {
    Value::Array(addrs.iter().map(|a| json!(a.0)).collect())
}

/// Decode a `check_elements` reply: one type mask per requested address.
pub fn decode_types(payload: &Value, expected: usize) -> Result<Vec<ElementType>, KbError> {
    let types = payload
        .as_array()
        .ok_or_else(|| KbError::protocol("check reply is not an array"))?
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|t| u32::try_from(t).ok())
                .map(ElementType)
                .ok_or_else(|| KbError::protocol(format!("'{v}' is not a type mask")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    expect_arity("check_elements", types.len(), expected)?;
    Ok(types)
}

/// Decode a `create_elements` reply: one address per command, in order.
pub fn decode_created(payload: &Value, expected: usize) -> Result<Vec<Addr>, KbError> {
    let addrs = decode_addr_list(payload)?;
    expect_arity("create_elements", addrs.len(), expected)?;
    Ok(addrs)
}

fn expect_arity(kind: &str, got: usize, expected: usize) -> Result<(), KbError> {
    if got == expected {
        Ok(())
    } else {
        Err(KbError::protocol(format!(
            "{kind} reply has {got} entries for {expected} requested"
        )))
    }
}

// =============================================================================
// LINK CONTENT
// =============================================================================

/// Payload for setting link contents.
pub fn set_contents(contents: &[LinkContent]) -> Result<Value, KbError> {
    contents
        .iter()
        .map(|c| {
            Ok(json!({
                "command": "set",
                "type": c.data.type_name(),
                "data": c.data.to_json(),
                "addr": c.target()?.0,
            }))
        })
        .collect::<Result<Vec<_>, KbError>>()
        .map(Value::Array)
}

/// Decode the per-link success flags of a set reply.
pub fn decode_set_results(payload: &Value, expected: usize) -> Result<Vec<bool>, KbError> {
    let flags = payload
        .as_array()
        .ok_or_else(|| KbError::protocol("content reply is not an array"))?
        .iter()
        .map(|v| {
            v.as_bool()
                .ok_or_else(|| KbError::protocol(format!("'{v}' is not a boolean")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    expect_arity("content", flags.len(), expected)?;
    Ok(flags)
}

/// Payload for reading link contents.
#[must_use]
pub fn get_contents(addrs: &[Addr]) -> Value {
    Value::Array(
        addrs
            .iter()
            .map(|a| json!({"command": "get", "addr": a.0}))
            .collect(),
    )
}

/// Decode a get reply. Entries without a value (links with no content) are skipped.
pub fn decode_contents(payload: &Value, addrs: &[Addr]) -> Result<Vec<LinkContent>, KbError> {
    let items = payload
        .as_array()
        .ok_or_else(|| KbError::protocol("content reply is not an array"))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let value = match item.get("value") {
            None | Some(Value::Null) => continue,
            Some(v) => v,
        };
        let type_name = item.get("type").and_then(Value::as_str).unwrap_or("string");
        out.push(LinkContent {
            data: LinkData::from_json(type_name, value)?,
            addr: addrs.get(i).copied(),
        });
    }
    Ok(out)
}

// =============================================================================
// KEYNODES
// =============================================================================

/// Payload resolving system identifiers. A valid type asks the store to
/// create the element when missing; an invalid one only looks it up.
#[must_use]
pub fn resolve_keynodes(params: &[(String, ElementType)]) -> Value {
    Value::Array(
        params
            .iter()
            .map(|(idtf, t)| {
                if t.is_valid() {
                    json!({"command": "resolve", "idtf": idtf, "elType": t.0})
                } else {
                    json!({"command": "find", "idtf": idtf})
                }
            })
            .collect(),
    )
}

/// Decode a keynodes reply, pairing each address with its identifier in
/// request order.
pub fn decode_keynodes(
    payload: &Value,
    params: &[(String, ElementType)],
) -> Result<Vec<(String, Addr)>, KbError> {
    let addrs = decode_addr_list(payload)?;
    expect_arity("keynodes", addrs.len(), params.len())?;
    Ok(params
        .iter()
        .map(|(idtf, _)| idtf.clone())
        .zip(addrs)
        .collect())
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// Payload for `generate_template`.
#[must_use]
pub fn generate_template(templ: Value, params: &BTreeMap<String, Addr>) -> Value {
    let params: Map<String, Value> = params
        .iter()
        .map(|(alias, addr)| (alias.clone(), json!(addr.0)))
        .collect();
    json!({"templ": templ, "params": params})
}

// =============================================================================
// EVENTS
// =============================================================================

/// Payload creating one subscription per `(element, event type)` pair.
pub fn create_events(requests: &[(Addr, EventType)]) -> Result<Value, KbError> {
    let create = requests
        .iter()
        .map(|(addr, t)| {
            if addr.is_valid() {
                Ok(json!({"type": t.as_str(), "addr": addr.0}))
            } else {
                Err(KbError::invalid("cannot subscribe to the invalid address"))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({"create": create}))
}

/// Decode the subscription ids assigned by the store, one per request.
pub fn decode_subscription_ids(
    payload: &Value,
    expected: usize,
) -> Result<Vec<SubscriptionId>, KbError> {
    let ids = payload
        .as_array()
        .ok_or_else(|| KbError::protocol("events reply is not an array"))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(SubscriptionId)
                .filter(|id| id.is_valid())
                .ok_or_else(|| KbError::protocol(format!("'{v}' is not a subscription id")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    expect_arity("events", ids.len(), expected)?;
    Ok(ids)
}

/// Payload destroying subscriptions.
#[must_use]
pub fn destroy_events(ids: &[SubscriptionId]) -> Value {
    json!({"delete": ids.iter().map(|id| id.0).collect::<Vec<_>>()})
}
