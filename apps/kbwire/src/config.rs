//! # Client Configuration
//!
//! Settings for the connection manager, loaded from a TOML file and then
//! overridden from the environment.
//!
//! ```toml
//! endpoint = "127.0.0.1:8090"
//! call_timeout_ms = 30000
//!
//! [reconnect]
//! initial_delay_ms = 5000
//! max_delay_ms = 60000
//! backoff_factor = 2
//! ```

use kbwire_core::KbError;
use kbwire_core::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_MAX_RECONNECT_DELAY_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RECONNECT_DELAY_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default store endpoint.
pub const DEFAULT_ENDPOINT: &str = "127.0.0.1:8090";

// =============================================================================
// RECONNECT POLICY
// =============================================================================

/// Exponential backoff between dial attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Multiplier applied after each failed attempt; 1 keeps the delay fixed.
    pub backoff_factor: u32,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_RECONNECT_DELAY_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(u64::from(self.backoff_factor));
            if delay >= self.max_delay_ms {
                delay = self.max_delay_ms;
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    #[must_use]
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }
}

// =============================================================================
// CLIENT CONFIG
// =============================================================================

/// Runtime configuration of a `Client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `host:port` of the store.
    pub endpoint: String,
    pub call_timeout_ms: u64,
    pub outbound_queue_capacity: usize,
    pub max_frame_bytes: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            outbound_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `endpoint`, defaults elsewhere.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, KbError> {
        toml::from_str(raw).map_err(|e| KbError::Config(format!("invalid config: {e}")))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, KbError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KbError::Io(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `KBWIRE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), KbError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), KbError> {
        if let Some(endpoint) = lookup("KBWIRE_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(raw) = lookup("KBWIRE_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = parse_var("KBWIRE_CALL_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("KBWIRE_QUEUE_CAPACITY") {
            self.outbound_queue_capacity = parse_var("KBWIRE_QUEUE_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("KBWIRE_MAX_RECONNECT_ATTEMPTS") {
            self.reconnect.max_attempts = Some(parse_var("KBWIRE_MAX_RECONNECT_ATTEMPTS", &raw)?);
        }
        Ok(())
    }

    /// Reject settings the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), KbError> {
        if self.endpoint.trim().is_empty() {
            return Err(KbError::Config("endpoint must not be empty".into()));
        }
        if self.call_timeout_ms == 0 {
            return Err(KbError::Config("call_timeout_ms must be positive".into()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(KbError::Config(
                "outbound_queue_capacity must be positive".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(KbError::Config("max_frame_bytes must be positive".into()));
        }
        let r = &self.reconnect;
        if r.backoff_factor == 0 {
            return Err(KbError::Config("reconnect.backoff_factor must be >= 1".into()));
        }
        if r.max_delay_ms < r.initial_delay_ms {
            return Err(KbError::Config(format!(
                "reconnect.max_delay_ms ({}) is below initial_delay_ms ({})",
                r.max_delay_ms, r.initial_delay_ms
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, KbError> {
    raw.trim()
        .parse()
        .map_err(|_| KbError::Config(format!("{key}='{raw}' is not a valid number")))
}
