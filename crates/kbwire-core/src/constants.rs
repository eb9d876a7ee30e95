//! # Protocol Constants
//!
//! Fixed values shared by the codecs and the runtime defaults.
//! Runtime values are only defaults; `ClientConfig` can override them.

/// Default wait window for a single outbound call (30 seconds).
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Default upper bound for the exponential reconnect delay.
pub const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 60_000;

/// Default multiplier applied to the reconnect delay after each failure.
///
/// A factor of 1 reproduces a fixed retry interval.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// Default capacity of the outbound record queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default upper bound for a single inbound record (16 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Prefix reserved for aliases generated by `Template::triple_with_relation`.
///
/// Explicit aliases may not start with it.
pub const GENERATED_ALIAS_PREFIX: &str = "@rel_edge_";

/// Number of addresses carried by an event-push payload.
pub const EVENT_PAYLOAD_ARITY: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(DEFAULT_CALL_TIMEOUT_MS, 30_000);
    }

    #[test]
    fn backoff_bounds_are_ordered() {
        assert!(DEFAULT_RECONNECT_DELAY_MS <= DEFAULT_MAX_RECONNECT_DELAY_MS);
        assert!(DEFAULT_BACKOFF_FACTOR >= 1);
    }
}
