//! In-memory store speaking the kbwire record protocol, plus a transport
//! that dials it over `tokio::io::duplex`.

#![allow(dead_code)]

use futures_util::future::BoxFuture;
use kbwire::{BoxedStream, Client, ClientConfig, ReconnectPolicy, Transport};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, oneshot};

/// Type assigned to edges the store creates itself.
pub const CONST_ACCESS_EDGE: u32 = 0x10 | 0x20 | 0x80 | 0x800;

#[derive(Default)]
struct StoreState {
    next_addr: u64,
    next_sub: u64,
    types: BTreeMap<u64, u32>,
    /// edge -> (source, target)
    edges: BTreeMap<u64, (u64, u64)>,
    contents: BTreeMap<u64, (String, Value)>,
    keynodes: BTreeMap<String, u64>,
    /// subscription -> (element, event type)
    subscriptions: BTreeMap<u64, (u64, String)>,
    received: Vec<String>,
    silent: bool,
    rejected: BTreeSet<String>,
    replay_on_subscribe: bool,
}

impl StoreState {
    fn alloc(&mut self, t: u32) -> u64 {
        self.next_addr += 1;
        let addr = 1000 + self.next_addr;
        self.types.insert(addr, t);
        addr
    }

    fn events_for(&self, element: u64, event_type: &str, payload: [u64; 3]) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|(_, (addr, t))| *addr == element && t == event_type)
            .map(|(id, _)| event_record(*id, payload))
            .collect()
    }

    fn connect(&mut self, src: u64, trg: u64, t: u32) -> (u64, Vec<String>) {
        let edge = self.alloc(t);
        self.edges.insert(edge, (src, trg));
        let events = self.events_for(src, "add_outgoing_edge", [src, edge, trg]);
        (edge, events)
    }

    fn remove(&mut self, addr: u64) -> Vec<String> {
        self.types.remove(&addr);
        self.contents.remove(&addr);
        match self.edges.remove(&addr) {
            Some((src, trg)) => self.events_for(src, "remove_outgoing_edge", [src, addr, trg]),
            None => Vec::new(),
        }
    }
}

fn event_record(subscription: u64, payload: [u64; 3]) -> String {
    json!({"id": subscription, "status": true, "event": true, "payload": payload}).to_string()
}

fn reply(id: u64, status: bool, payload: Value) -> String {
    json!({"id": id, "status": status, "event": false, "payload": payload}).to_string()
}

struct Live {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    kill: oneshot::Sender<()>,
}

struct Inner {
    state: Mutex<StoreState>,
    live: Mutex<Option<Live>>,
    refuse: AtomicBool,
    dials: AtomicUsize,
}

/// Shared handle to the mock store.
#[derive(Clone)]
pub struct MockStore {
    inner: Arc<Inner>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(StoreState::default()),
                live: Mutex::new(None),
                refuse: AtomicBool::new(false),
                dials: AtomicUsize::new(0),
            }),
        }
    }

    pub fn transport(&self) -> DuplexTransport {
        DuplexTransport {
            store: self.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // knobs
    // -------------------------------------------------------------------------

    /// Swallow every request without replying.
    pub fn set_silent(&self, silent: bool) {
        self.inner.state.lock().unwrap().silent = silent;
    }

    /// Reply with a failure status to every request of `kind`.
    pub fn reject(&self, kind: &str) {
        self.inner.state.lock().unwrap().rejected.insert(kind.to_string());
    }

    /// Follow every add-edge subscription ack with events for the host's
    /// existing edges, as if they were created right after subscribing.
    pub fn replay_edges_on_subscribe(&self, replay: bool) {
        self.inner.state.lock().unwrap().replay_on_subscribe = replay;
    }

    pub fn refuse_dials(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn dials(&self) -> usize {
        self.inner.dials.load(Ordering::SeqCst)
    }

    /// Drop the live connection from the store side.
    pub fn disconnect(&self) {
        if let Some(live) = self.inner.live.lock().unwrap().take() {
            let _ = live.kill.send(());
        }
    }

    /// Send a raw line to the live connection.
    pub fn push_raw(&self, line: impl Into<String>) {
        self.push_bytes(line.into().into_bytes());
    }

    /// Send arbitrary bytes as one line, valid UTF-8 or not.
    pub fn push_bytes(&self, line: Vec<u8>) {
        if let Some(live) = self.inner.live.lock().unwrap().as_ref() {
            let _ = live.outbound.send(line);
        }
    }

    pub fn push_event(&self, subscription: u64, payload: [u64; 3]) {
        self.push_raw(event_record(subscription, payload));
    }

    fn push_all(&self, records: Vec<String>) {
        for record in records {
            self.push_raw(record);
        }
    }

    // -------------------------------------------------------------------------
    // graph
    // -------------------------------------------------------------------------

    pub fn add_element(&self, t: u32) -> u64 {
        self.inner.state.lock().unwrap().alloc(t)
    }

    /// Create an edge store-side, notifying subscribers.
    pub fn connect(&self, src: u64, trg: u64) -> u64 {
        let (edge, events) = self
            .inner
            .state
            .lock()
            .unwrap()
            .connect(src, trg, CONST_ACCESS_EDGE);
        self.push_all(events);
        edge
    }

    /// Delete an element store-side, notifying subscribers.
    pub fn remove(&self, addr: u64) {
        let events = self.inner.state.lock().unwrap().remove(addr);
        self.push_all(events);
    }

    pub fn edges_between(&self, src: u64, trg: u64) -> usize {
        let state = self.inner.state.lock().unwrap();
        state.edges.values().filter(|e| **e == (src, trg)).count()
    }

    pub fn exists(&self, addr: u64) -> bool {
        self.inner.state.lock().unwrap().types.contains_key(&addr)
    }

    pub fn content(&self, addr: u64) -> Option<Value> {
        let state = self.inner.state.lock().unwrap();
        state.contents.get(&addr).map(|(_, v)| v.clone())
    }

    pub fn set_keynode(&self, idtf: &str, addr: u64) {
        let mut state = self.inner.state.lock().unwrap();
        state.keynodes.insert(idtf.to_string(), addr);
    }

    /// Subscription id registered for `(element, event type)`.
    pub fn subscription_for(&self, element: u64, event_type: &str) -> Option<u64> {
        let state = self.inner.state.lock().unwrap();
        state
            .subscriptions
            .iter()
            .find(|(_, (addr, t))| *addr == element && t == event_type)
            .map(|(id, _)| *id)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().unwrap().subscriptions.len()
    }

    /// Request kinds received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().received.clone()
    }

    // -------------------------------------------------------------------------
    // serving
    // -------------------------------------------------------------------------

    fn attach(&self, server: DuplexStream) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (kill, kill_rx) = oneshot::channel();
        *self.inner.live.lock().unwrap() = Some(Live {
            outbound: outbound.clone(),
            kill,
        });
        tokio::spawn(serve(self.clone(), server, outbound, outbound_rx, kill_rx));
    }

    fn handle(&self, line: &str) -> Vec<String> {
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let id = request["id"].as_u64().unwrap_or(0);
        let kind = request["type"].as_str().unwrap_or("").to_string();
        let payload = &request["payload"];

        let mut state = self.inner.state.lock().unwrap();
        state.received.push(kind.clone());
        if state.silent {
            return Vec::new();
        }
        if state.rejected.contains(&kind) {
            return vec![reply(id, false, json!({"message": "rejected by mock"}))];
        }

        let mut events = Vec::new();
        let result = match kind.as_str() {
            "check_elements" => json!(
                payload
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|a| *state.types.get(&a.as_u64().unwrap()).unwrap_or(&0))
                    .collect::<Vec<_>>()
            ),
            "create_elements" => create(&mut state, payload, &mut events),
            "delete_elements" => {
                for a in payload.as_array().unwrap() {
                    events.extend(state.remove(a.as_u64().unwrap()));
                }
                json!(true)
            }
            "content" => content(&mut state, payload),
            "keynodes" => keynodes(&mut state, payload),
            "search_template" => search(&state, payload),
            "generate_template" => generate(&mut state, payload, &mut events),
            "events" => {
                let ids = subscriptions(&mut state, payload);
                if state.replay_on_subscribe {
                    events.extend(replayed_edges(&state, &ids));
                }
                ids
            }
            _ => return vec![reply(id, false, json!({"message": "unknown request"}))],
        };
        drop(state);

        let mut out = vec![reply(id, true, result)];
        out.extend(events);
        out
    }
}

async fn serve(
    store: MockStore,
    stream: DuplexStream,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut kill: oneshot::Receiver<()>,
) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    for record in store.handle(&line) {
                        let _ = outbound.send(record.into_bytes());
                    }
                }
                _ => break,
            },
            record = outbound_rx.recv() => match record {
                Some(mut framed) => {
                    framed.push(b'\n');
                    if write_half.write_all(&framed).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = &mut kill => break,
        }
    }
}

// =============================================================================
// REQUEST HANDLERS
// =============================================================================

fn create(state: &mut StoreState, payload: &Value, events: &mut Vec<String>) -> Value {
    let commands = payload.as_array().unwrap();
    let addrs: Vec<u64> = commands
        .iter()
        .map(|c| state.alloc(c["type"].as_u64().unwrap() as u32))
        .collect();
    let resolve = |end: &Value| match end["type"].as_str() {
        Some("ref") => addrs[end["value"].as_u64().unwrap() as usize],
        _ => end["value"].as_u64().unwrap(),
    };
    for (i, c) in commands.iter().enumerate() {
        match c["el"].as_str() {
            Some("edge") => {
                let (src, trg) = (resolve(&c["src"]), resolve(&c["trg"]));
                state.edges.insert(addrs[i], (src, trg));
                events.extend(state.events_for(src, "add_outgoing_edge", [src, addrs[i], trg]));
            }
            Some("link") => {
                let t = c["content_type"].as_str().unwrap_or("string").to_string();
                state.contents.insert(addrs[i], (t, c["content"].clone()));
            }
            _ => {}
        }
    }
    json!(addrs)
}

fn content(state: &mut StoreState, payload: &Value) -> Value {
    let items = payload.as_array().unwrap().iter().map(|cmd| {
        let addr = cmd["addr"].as_u64().unwrap();
        match cmd["command"].as_str() {
            Some("set") if state.types.contains_key(&addr) => {
                let t = cmd["type"].as_str().unwrap_or("string").to_string();
                state.contents.insert(addr, (t, cmd["data"].clone()));
                json!(true)
            }
            Some("set") => json!(false),
            _ => match state.contents.get(&addr) {
                Some((t, v)) => json!({"value": v, "type": t}),
                None => json!({"value": null}),
            },
        }
    });
    Value::Array(items.collect())
}

fn keynodes(state: &mut StoreState, payload: &Value) -> Value {
    let mut out = Vec::new();
    for cmd in payload.as_array().unwrap() {
        let idtf = cmd["idtf"].as_str().unwrap().to_string();
        let addr = match (state.keynodes.get(&idtf).copied(), cmd["command"].as_str()) {
            (Some(addr), _) => addr,
            (None, Some("resolve")) => {
                let addr = state.alloc(cmd["elType"].as_u64().unwrap() as u32);
                state.keynodes.insert(idtf, addr);
                addr
            }
            (None, _) => 0,
        };
        out.push(addr);
    }
    json!(out)
}

/// Alias table of a template payload: first occurrence of each alias.
fn alias_table(templ: &Value) -> Map<String, Value> {
    let mut aliases = Map::new();
    for (i, triple) in templ.as_array().unwrap().iter().enumerate() {
        for (j, item) in triple.as_array().unwrap().iter().enumerate() {
            if let Some(alias) = item["alias"].as_str() {
                aliases.entry(alias.to_string()).or_insert(json!(i * 3 + j));
            }
        }
    }
    aliases
}

/// Single-triple matcher: `addr --edge--> (addr | type)`.
fn matches(state: &StoreState, templ: &Value) -> Vec<[u64; 3]> {
    let triple = &templ[0];
    let src = triple[0]["value"].as_u64().unwrap();
    let target = &triple[2];
    state
        .edges
        .iter()
        .filter(|(_, (s, _))| *s == src)
        .filter(|(_, (_, t))| match target["type"].as_str() {
            Some("addr") => target["value"].as_u64() == Some(*t),
            Some("type") => {
                let want = target["value"].as_u64().unwrap() as u32;
                state.types.get(t).is_some_and(|have| have & want == want)
            }
            _ => true,
        })
        .map(|(edge, (s, t))| [*s, *edge, *t])
        .collect()
}

fn search(state: &StoreState, templ: &Value) -> Value {
    let found: Vec<Vec<u64>> = matches(state, templ).into_iter().map(Vec::from).collect();
    json!({"aliases": alias_table(templ), "addrs": found})
}

fn generate(state: &mut StoreState, payload: &Value, events: &mut Vec<String>) -> Value {
    let templ = &payload["templ"];
    let triple = &templ[0];
    let src = triple[0]["value"].as_u64().unwrap();
    let trg = triple[2]["value"].as_u64().unwrap();
    let (edge, fired) = state.connect(src, trg, CONST_ACCESS_EDGE);
    events.extend(fired);
    json!({"aliases": alias_table(templ), "addrs": [src, edge, trg]})
}

fn subscriptions(state: &mut StoreState, payload: &Value) -> Value {
    if let Some(create) = payload["create"].as_array() {
        let mut ids = Vec::new();
        for req in create {
            state.next_sub += 1;
            let id = state.next_sub;
            let element = req["addr"].as_u64().unwrap();
            let t = req["type"].as_str().unwrap().to_string();
            state.subscriptions.insert(id, (element, t));
            ids.push(id);
        }
        return json!(ids);
    }
    for id in payload["delete"].as_array().unwrap() {
        state.subscriptions.remove(&id.as_u64().unwrap());
    }
    json!(true)
}

/// Add events for the existing edges of every new add-edge subscription.
fn replayed_edges(state: &StoreState, ids: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for id in ids.as_array().into_iter().flatten().filter_map(Value::as_u64) {
        let Some((element, t)) = state.subscriptions.get(&id) else {
            continue;
        };
        if t != "add_outgoing_edge" {
            continue;
        }
        for (edge, (src, trg)) in &state.edges {
            if src == element {
                out.push(event_record(id, [*src, *edge, *trg]));
            }
        }
    }
    out
}

// =============================================================================
// TRANSPORT + CLIENT HELPERS
// =============================================================================

/// Dials the mock store through an in-memory duplex pipe.
pub struct DuplexTransport {
    store: MockStore,
}

impl Transport for DuplexTransport {
    fn dial(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            self.store.inner.dials.fetch_add(1, Ordering::SeqCst);
            if self.store.inner.refuse.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
            }
            let (client, server) = tokio::io::duplex(64 * 1024);
            self.store.attach(server);
            Ok(Box::new(client) as BoxedStream)
        })
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Configuration with short delays for tests.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        endpoint: "mock".into(),
        call_timeout_ms: 2_000,
        reconnect: ReconnectPolicy {
            initial_delay_ms: 10,
            max_delay_ms: 50,
            backoff_factor: 2,
            max_attempts: None,
        },
        ..ClientConfig::default()
    }
}

pub async fn connect_with(store: &MockStore, config: ClientConfig) -> Client {
    let client = Client::with_transport(config, store.transport()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), client.wait_connected())
        .await
        .unwrap()
        .unwrap();
    client
}

pub async fn connect(store: &MockStore) -> Client {
    connect_with(store, test_config()).await
}

/// Poll `cond` until it holds or five seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
