//! # Request Dispatcher
//!
//! Turns a `(kind, payload)` pair into exactly one outcome: the reply
//! payload, `RemoteRejected`, or `Timeout`.
//!
//! A timeout is decided locally. Nothing is sent to the store, which may
//! still act on the request; treat it as an unknown outcome.

use crate::connection::ConnectionManager;
use crate::registry::{EventCallback, Registry};
use kbwire_core::{KbError, OutboundEnvelope, RequestKind, encode_record};
use serde_json::Value;
use tracing::debug;

/// Correlates outbound requests with their replies.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    conn: ConnectionManager,
}

/// Removes the correlation entry when the waiting call ends for any reason,
/// including the caller dropping the future.
struct PendingCall<'a> {
    registry: &'a Registry,
    id: u64,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.registry.cancel(self.id);
    }
}

impl RequestDispatcher {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    /// Send one request and wait for its reply payload.
    pub async fn call(&self, kind: RequestKind, payload: Value) -> Result<Value, KbError> {
        self.call_with(kind, payload, Vec::new()).await
    }

    /// As [`call`](Self::call), installing `callbacks` for the subscription
    /// ids carried by a successful reply.
    pub(crate) async fn call_with(
        &self,
        kind: RequestKind,
        payload: Value,
        callbacks: Vec<EventCallback>,
    ) -> Result<Value, KbError> {
        let registry = self.conn.registry();
        let (id, mut rx) = registry.register(callbacks)?;
        let _pending = PendingCall { registry, id };

        let record = encode_record(&OutboundEnvelope::new(id, kind, payload))?;
        self.conn.enqueue(record)?;

        let window = self.conn.config().call_timeout();
        let waited = tokio::time::timeout(window, &mut rx).await;
        let reply = match waited {
            Ok(reply) => reply,
            // The pump claimed the entry right at the deadline; its reply is
            // on the way and may carry installed subscriptions.
            Err(_) if !registry.cancel(id) => rx.await,
            Err(_) => {
                debug!(id, kind = kind.as_str(), "call timed out");
                return Err(KbError::Timeout {
                    kind: kind.as_str().to_string(),
                    after_ms: self.conn.config().call_timeout_ms,
                });
            }
        };
        match reply {
            Ok(reply) if reply.status => Ok(reply.payload),
            Ok(reply) => Err(KbError::RemoteRejected {
                kind: kind.as_str().to_string(),
                reason: reply.failure_reason(),
            }),
            Err(_) => Err(KbError::Closed),
        }
    }
}
