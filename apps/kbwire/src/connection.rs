//! # Connection Manager
//!
//! Owns the one connection to the store.
//!
//! A supervisor task dials through the configured [`Transport`], runs a
//! session while the stream is healthy and redials with exponential backoff
//! when it is not. Each session drives two halves concurrently:
//!
//! - the inbound pump, which classifies every record as a reply (handed to
//!   the registry) or an event push (handed to the event router)
//! - the outbound writer, which drains the bounded record queue
//!
//! ## State Machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> Connecting -> ...
//!        \______________\_____________\______ close() ______> Closed
//! ```
//!
//! `Closed` is terminal. It is entered through [`ConnectionManager::close`],
//! when the last handle is dropped, or when a configured attempt cap is hit.

use crate::config::ClientConfig;
use crate::events::route_event;
use crate::registry::Registry;
use crate::transport::{BoxedStream, Frame, Transport, read_frame, write_frame};
use kbwire_core::{KbError, decode_record};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

pub(crate) struct Shared {
    config: ClientConfig,
    pub(crate) registry: Registry,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    outbound: mpsc::Sender<String>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            info!(state = %next, "connection state changed");
        }
    }

    /// Enter `Closed`. Pending callers are woken with `Closed`; the
    /// subscription table is emptied.
    fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        self.state.send_replace(ConnectionState::Closed);
        self.registry.close();
        info!("connection closed");
    }

    /// Classify one inbound record and hand it on.
    fn route(&self, line: &str) {
        let envelope = match decode_record(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping unclassifiable inbound record");
                return;
            }
        };
        if envelope.event {
            route_event(&self.registry, &envelope);
        } else {
            let id = envelope.id;
            if !self.registry.resolve(envelope) {
                debug!(id, "dropping reply with no waiting call");
            }
        }
    }
}

/// Closes the manager when the last user-facing handle goes away.
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

// =============================================================================
// CONNECTION MANAGER
// =============================================================================

/// Handle to a supervised store connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
    _guard: Arc<CloseOnDrop>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl ConnectionManager {
    /// Validate `config` and start the supervisor.
    ///
    /// Must be called from within a tokio runtime. Returns immediately; the
    /// first dial happens in the background.
    pub fn open(config: ClientConfig, transport: impl Transport) -> Result<Self, KbError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            KbError::Config("the connection must be opened inside a tokio runtime".into())
        })?;

        let (outbound, outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            registry: Registry::default(),
            state,
            shutdown,
            outbound,
            supervisor: Mutex::new(None),
        });

        let task = runtime.spawn(supervise(
            Arc::clone(&shared),
            Box::new(transport),
            outbound_rx,
        ));
        *shared
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(Self {
            _guard: Arc::new(CloseOnDrop(Arc::clone(&shared))),
            shared,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Wait until the connection is up. Fails with `Closed` if it never
    /// will be.
    pub async fn wait_connected(&self) -> Result<(), KbError> {
        let mut rx = self.watch_state();
        let state = rx
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .await
            .map(|s| *s)
            .map_err(|_| KbError::Closed)?;
        match state {
            ConnectionState::Connected => Ok(()),
            _ => Err(KbError::Closed),
        }
    }

    /// Number of calls still waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.pending_len()
    }

    /// Queue one encoded record for the writer.
    ///
    /// Records queue up while disconnected; a full queue is reported
    /// instead of growing without bound.
    pub(crate) fn enqueue(&self, record: String) -> Result<(), KbError> {
        if *self.shared.shutdown.borrow() {
            return Err(KbError::Closed);
        }
        self.shared.outbound.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => KbError::QueueFull {
                capacity: self.shared.config.outbound_queue_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => KbError::Closed,
        })
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    /// Shut the connection down and wait for the supervisor to exit.
    /// Idempotent.
    pub async fn close(&self) {
        self.shared.shutdown();
        let task = self
            .shared
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "connection supervisor ended abnormally");
            }
        }
    }
}

// =============================================================================
// SUPERVISOR
// =============================================================================

enum SessionEnd {
    Lost(String),
    Closed,
}

async fn supervise(
    shared: Arc<Shared>,
    transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let policy = shared.config.reconnect.clone();
    let peer = transport.describe();
    let mut carry: Option<String> = None;
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);
        let dialed = tokio::select! {
            dialed = transport.dial() => dialed,
            _ = shutdown.wait_for(|closed| *closed) => break,
        };

        let delay = match dialed {
            Ok(stream) => {
                failures = 0;
                shared.set_state(ConnectionState::Connected);
                info!(peer = %peer, "connected to store");
                let end = run_session(&shared, stream, &mut outbound_rx, &mut carry, &mut shutdown)
                    .await;
                match end {
                    SessionEnd::Closed => break,
                    SessionEnd::Lost(reason) => {
                        warn!(peer = %peer, reason = %reason, "connection lost");
                    }
                }
                shared.set_state(ConnectionState::Disconnected);
                policy.delay_for(1)
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                shared.set_state(ConnectionState::Disconnected);
                warn!(peer = %peer, error = %e, attempt = failures, "dial failed");
                if !policy.allows(failures) {
                    warn!(peer = %peer, attempts = failures, "giving up on reconnecting");
                    break;
                }
                policy.delay_for(failures)
            }
        };

        debug!(delay_ms = delay.as_millis() as u64, "waiting before redial");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|closed| *closed) => break,
        }
    }

    shared.shutdown();
}

async fn run_session(
    shared: &Shared,
    stream: BoxedStream,
    outbound_rx: &mut mpsc::Receiver<String>,
    carry: &mut Option<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let writer = async {
        loop {
            // `carry` holds the record until it is fully written, so a
            // session torn down mid-write retries it on the next connection.
            if carry.is_none() {
                match outbound_rx.recv().await {
                    Some(record) => *carry = Some(record),
                    None => return SessionEnd::Closed,
                }
            }
            if let Some(record) = carry.as_deref() {
                if let Err(e) = write_frame(&mut write_half, record).await {
                    return SessionEnd::Lost(format!("write failed: {e}"));
                }
            }
            *carry = None;
        }
    };

    tokio::select! {
        end = pump(shared, &mut reader) => end,
        end = writer => end,
        _ = shutdown.wait_for(|closed| *closed) => SessionEnd::Closed,
    }
}

/// Inbound loop: one record per frame until the stream fails.
async fn pump<R: AsyncBufRead + Unpin>(shared: &Shared, reader: &mut R) -> SessionEnd {
    let limit = shared.config.max_frame_bytes;
    loop {
        match read_frame(reader, limit).await {
            Ok(Frame::Record(line)) => {
                if !line.trim().is_empty() {
                    shared.route(&line);
                }
            }
            Ok(Frame::Oversized(bytes)) => {
                warn!(bytes, limit, "dropping oversized inbound record");
            }
            Ok(Frame::Eof) => return SessionEnd::Lost("peer closed the stream".into()),
            Err(e) => return SessionEnd::Lost(format!("read failed: {e}")),
        }
    }
}
