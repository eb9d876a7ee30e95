//! # Reactive Set
//!
//! A local mirror of the elements a host node points at through positive
//! access edges, kept current by add/remove events on the host.
//!
//! Members are keyed by the connecting edge, not by the member itself: the
//! remove event only names the edge, and one element may hang off the host
//! through several edges.
//!
//! ## Lifecycle
//!
//! 1. [`ReactiveSet::initialize`] subscribes first, then seeds the mirror
//!    with one search, so nothing added in between is missed.
//! 2. Event callbacks only forward into a channel; a dedicated task applies
//!    them (including the filter's type check) off the inbound pump.
//! 3. [`ReactiveSet::release`] stops the task and destroys the
//!    subscriptions. Dropping the set only stops the task.

use crate::client::Client;
use crate::events::{EventHandle, EventRequest};
use kbwire_core::{Addr, ElementType, EventType, KbError, Template, TemplateItem};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

const EDGE_ALIAS: &str = "_edge";
const ITEM_ALIAS: &str = "_item";

/// Notified as the mirrored set changes. Every method defaults to a no-op.
pub trait SetObserver: Send + Sync + 'static {
    fn on_initialize(&self, _members: &[Addr]) {}
    fn on_add(&self, _member: Addr) {}
    fn on_remove(&self, _member: Addr) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SetObserver for NoopObserver {}

#[derive(Debug, Clone, Copy)]
enum SetEvent {
    Added { edge: Addr, member: Addr },
    Removed { edge: Addr },
}

struct Mirror {
    /// connecting edge -> member
    members: Mutex<BTreeMap<Addr, Addr>>,
    observer: Box<dyn SetObserver>,
}

impl Mirror {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<Addr, Addr>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ReactiveSet {
    client: Client,
    host: Addr,
    filter: Option<ElementType>,
    mirror: Arc<Mirror>,
    handles: Vec<EventHandle>,
    stop: Option<oneshot::Sender<()>>,
}

impl ReactiveSet {
    /// A set mirroring `host`. Only elements whose type contains every bit
    /// of `filter` are admitted.
    pub fn new(
        client: Client,
        host: Addr,
        filter: Option<ElementType>,
        observer: impl SetObserver,
    ) -> Result<Self, KbError> {
        if !host.is_valid() {
            return Err(KbError::invalid("reactive set needs a valid host address"));
        }
        Ok(Self {
            client,
            host,
            filter,
            mirror: Arc::new(Mirror {
                members: Mutex::new(BTreeMap::new()),
                observer: Box::new(observer),
            }),
            handles: Vec::new(),
            stop: None,
        })
    }

    #[must_use]
    pub fn host(&self) -> Addr {
        self.host
    }

    /// Subscribe to the host's edge events, then seed from one search.
    pub async fn initialize(&mut self) -> Result<(), KbError> {
        if self.stop.is_some() {
            return Err(KbError::invalid("reactive set is already initialized"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let add_tx = tx.clone();
        let requests = vec![
            EventRequest::new(self.host, EventType::AddOutgoingEdge, move |n| {
                if n.other.is_valid() {
                    let _ = add_tx.send(SetEvent::Added {
                        edge: n.edge,
                        member: n.other,
                    });
                }
            }),
            EventRequest::new(self.host, EventType::RemoveOutgoingEdge, move |n| {
                let _ = tx.send(SetEvent::Removed { edge: n.edge });
            }),
        ];
        self.handles = self.client.events_create(requests).await?;

        let seeded = match self.seed().await {
            Ok(seeded) => seeded,
            Err(e) => {
                self.unsubscribe().await;
                return Err(e);
            }
        };
        self.mirror.observer.on_initialize(&seeded);

        let (stop, stop_rx) = oneshot::channel();
        self.stop = Some(stop);
        tokio::spawn(apply_events(
            self.client.clone(),
            self.filter,
            Arc::clone(&self.mirror),
            rx,
            stop_rx,
        ));
        Ok(())
    }

    async fn seed(&self) -> Result<Vec<Addr>, KbError> {
        let mut template = Template::new();
        template.triple(
            self.host,
            TemplateItem::named(ElementType::ARC_POS_VAR_PERM, EDGE_ALIAS)?,
            TemplateItem::named(ElementType::UNKNOWN, ITEM_ALIAS)?,
        )?;
        let results = self.client.template_search(&template).await?;

        let mut found = Vec::with_capacity(results.len());
        for result in &results {
            found.push((result.get(EDGE_ALIAS)?, result.get(ITEM_ALIAS)?));
        }
        let items: Vec<Addr> = found.iter().map(|(_, item)| *item).collect();
        let admitted = admit(&self.client, self.filter, &items).await?;

        let mut members = self.mirror.lock();
        let mut seeded = Vec::new();
        for ((edge, item), ok) in found.into_iter().zip(admitted) {
            if ok && members.insert(edge, item).is_none() {
                seeded.push(item);
            }
        }
        Ok(seeded)
    }

    /// Connect `member` to the host unless an edge already does.
    /// Returns true when a new edge was created.
    pub async fn add_item(&self, member: Addr) -> Result<bool, KbError> {
        if !member.is_valid() {
            return Err(KbError::invalid("cannot add the invalid address to a set"));
        }
        let mut template = Template::new();
        template.triple(
            self.host,
            TemplateItem::named(ElementType::ARC_POS_VAR_PERM, EDGE_ALIAS)?,
            member,
        )?;
        if !self.client.template_search(&template).await?.is_empty() {
            return Ok(false);
        }
        let generated = self
            .client
            .template_generate(&template, &BTreeMap::new())
            .await?;
        debug!(
            host = %self.host,
            member = %member,
            edge = %generated.get(EDGE_ALIAS)?,
            "set member added"
        );
        Ok(true)
    }

    /// Distinct members currently mirrored.
    #[must_use]
    pub fn members(&self) -> Vec<Addr> {
        let members = self.mirror.lock();
        members
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[must_use]
    pub fn contains(&self, member: Addr) -> bool {
        self.mirror.lock().values().any(|m| *m == member)
    }

    /// Number of connecting edges mirrored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mirror.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mirror.lock().is_empty()
    }

    /// Stop following the host and destroy both subscriptions.
    pub async fn release(&mut self) -> Result<(), KbError> {
        self.stop = None;
        let handles = std::mem::take(&mut self.handles);
        self.client.events_destroy(&handles).await
    }

    async fn unsubscribe(&mut self) {
        if let Err(e) = self.release().await {
            warn!(host = %self.host, error = %e, "failed to release set subscriptions");
        }
    }
}

/// For each address, whether it passes the type filter.
async fn admit(
    client: &Client,
    filter: Option<ElementType>,
    addrs: &[Addr],
) -> Result<Vec<bool>, KbError> {
    match filter {
        None => Ok(vec![true; addrs.len()]),
        Some(filter) => Ok(client
            .check_elements(addrs)
            .await?
            .into_iter()
            .map(|t| t.contains(filter))
            .collect()),
    }
}

async fn apply_events(
    client: Client,
    filter: Option<ElementType>,
    mirror: Arc<Mirror>,
    mut events: mpsc::UnboundedReceiver<SetEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = &mut stop => break,
        };
        match event {
            SetEvent::Added { edge, member } => {
                if mirror.lock().contains_key(&edge) {
                    continue;
                }
                let admitted = match admit(&client, filter, &[member]).await {
                    Ok(flags) => flags.first().copied().unwrap_or(false),
                    Err(e) => {
                        warn!(member = %member, error = %e, "type check failed; member skipped");
                        false
                    }
                };
                if admitted && mirror.lock().insert(edge, member).is_none() {
                    mirror.observer.on_add(member);
                }
            }
            SetEvent::Removed { edge } => {
                let removed = mirror.lock().remove(&edge);
                if let Some(member) = removed {
                    mirror.observer.on_remove(member);
                }
            }
        }
    }
}
