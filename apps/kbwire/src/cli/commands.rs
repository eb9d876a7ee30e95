//! # CLI Command Implementations

use crate::client::Client;
use crate::config::ClientConfig;
use crate::events::EventRequest;
use crate::set::{ReactiveSet, SetObserver};
use kbwire_core::{Addr, ElementType, EventNotification, EventType, KbError, LinkContent, LinkData};
use serde_json::{Value, json};

/// How results are printed.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    fn info(&self, msg: &str) {
        if !self.quiet && !self.json {
            eprintln!("{msg}");
        }
    }

    fn emit(&self, value: &Value, text: impl FnOnce() -> String) {
        if self.json {
            println!("{value}");
        } else {
            println!("{}", text());
        }
    }
}

fn addrs_of(raw: &[u64]) -> Vec<Addr> {
    raw.iter().copied().map(Addr).collect()
}

/// Open a client and wait for the first connection.
pub async fn connect(config: ClientConfig, output: Output) -> Result<Client, KbError> {
    output.info(&format!("Connecting to {}...", config.endpoint));
    let window = config.call_timeout();
    let client = Client::connect(config)?;
    match tokio::time::timeout(window, client.wait_connected()).await {
        Ok(result) => result?,
        Err(_) => {
            client.close().await;
            return Err(KbError::ConnectionLost(
                "store did not accept the connection in time".into(),
            ));
        }
    }
    Ok(client)
}

async fn wait_for_interrupt() -> Result<(), KbError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| KbError::Io(format!("cannot listen for Ctrl-C: {e}")))
}

// =============================================================================
// ELEMENT COMMANDS
// =============================================================================

pub async fn cmd_check(client: &Client, output: Output, raw: &[u64]) -> Result<(), KbError> {
    let addrs = addrs_of(raw);
    let types = client.check_elements(&addrs).await?;
    for (addr, t) in addrs.iter().zip(&types) {
        let kind = t
            .kind()
            .map_or_else(|| "unknown".to_string(), |k| format!("{k:?}").to_lowercase());
        output.emit(
            &json!({"addr": addr.0, "type": t.0, "kind": kind}),
            || format!("{addr}\t{t}\t{kind}"),
        );
    }
    Ok(())
}

pub async fn cmd_resolve(
    client: &Client,
    output: Output,
    idtfs: Vec<String>,
    create: bool,
) -> Result<(), KbError> {
    let t = if create {
        ElementType::NODE_CONST
    } else {
        ElementType::UNKNOWN
    };
    let params: Vec<(String, ElementType)> = idtfs.into_iter().map(|i| (i, t)).collect();
    for (idtf, addr) in client.resolve_keynodes(&params).await? {
        output.emit(&json!({"idtf": idtf, "addr": addr.0}), || {
            if addr.is_valid() {
                format!("{idtf}\t{addr}")
            } else {
                format!("{idtf}\t(not found)")
            }
        });
    }
    Ok(())
}

pub async fn cmd_delete(client: &Client, output: Output, raw: &[u64]) -> Result<(), KbError> {
    client.delete_elements(&addrs_of(raw)).await?;
    output.emit(&json!({"deleted": raw}), || format!("Deleted {} element(s)", raw.len()));
    Ok(())
}

// =============================================================================
// CONTENT COMMANDS
// =============================================================================

fn content_json(data: &LinkData) -> Value {
    json!({"type": data.type_name(), "value": data.to_json()})
}

fn content_text(data: &LinkData) -> String {
    match data {
        LinkData::Int(v) => v.to_string(),
        LinkData::Float(v) => v.to_string(),
        LinkData::String(v) => v.clone(),
        LinkData::Binary(v) => format!("<{} bytes>", v.len()),
    }
}

pub async fn cmd_content_get(client: &Client, output: Output, raw: &[u64]) -> Result<(), KbError> {
    for content in client.get_link_contents(&addrs_of(raw)).await? {
        let addr = content.addr.unwrap_or_default();
        let mut value = content_json(&content.data);
        value["addr"] = json!(addr.0);
        output.emit(&value, || format!("{addr}\t{}", content_text(&content.data)));
    }
    Ok(())
}

pub async fn cmd_content_set(
    client: &Client,
    output: Output,
    addr: u64,
    value: String,
) -> Result<(), KbError> {
    let flags = client
        .set_link_contents(&[LinkContent::for_link(Addr(addr), value)])
        .await?;
    let ok = flags.first().copied().unwrap_or(false);
    output.emit(&json!({"addr": addr, "updated": ok}), || {
        if ok {
            format!("Updated {addr}")
        } else {
            format!("Store refused to update {addr}")
        }
    });
    Ok(())
}

// =============================================================================
// EVENT COMMANDS
// =============================================================================

fn notification_json(event: &str, n: &EventNotification) -> Value {
    json!({
        "event": event,
        "subscription": n.subscription.0,
        "element": n.element.0,
        "edge": n.edge.0,
        "other": n.other.0,
    })
}

pub async fn cmd_watch(
    client: &Client,
    output: Output,
    addr: u64,
    names: &[String],
) -> Result<(), KbError> {
    let requests = names
        .iter()
        .map(|name| {
            let event_type: EventType = name.parse()?;
            let label = event_type.as_str();
            Ok(EventRequest::new(Addr(addr), event_type, move |n| {
                output.emit(&notification_json(label, &n), || {
                    format!("{label}\telement={}\tedge={}\tother={}", n.element, n.edge, n.other)
                });
            }))
        })
        .collect::<Result<Vec<_>, KbError>>()?;

    let handles = client.events_create(requests).await?;
    output.info(&format!(
        "Watching {addr} ({} subscription(s)); Ctrl-C to stop",
        handles.len()
    ));
    wait_for_interrupt().await?;
    client.events_destroy(&handles).await
}

/// Prints set changes as they are applied.
struct PrintObserver(Output);

impl SetObserver for PrintObserver {
    fn on_initialize(&self, members: &[Addr]) {
        for m in members {
            self.0.emit(&json!({"member": m.0}), || m.to_string());
        }
    }

    fn on_add(&self, member: Addr) {
        self.0
            .emit(&json!({"added": member.0}), || format!("+ {member}"));
    }

    fn on_remove(&self, member: Addr) {
        self.0
            .emit(&json!({"removed": member.0}), || format!("- {member}"));
    }
}

pub async fn cmd_members(
    client: &Client,
    output: Output,
    host: u64,
    filter: Option<u32>,
    follow: bool,
) -> Result<(), KbError> {
    let mut set = ReactiveSet::new(
        client.clone(),
        Addr(host),
        filter.map(ElementType),
        PrintObserver(output),
    )?;
    set.initialize().await?;
    output.info(&format!("{} member(s)", set.members().len()));
    if follow {
        output.info("Following changes; Ctrl-C to stop");
        wait_for_interrupt().await?;
    }
    set.release().await
}
