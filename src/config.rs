//! # Session configuration.
//!
//! [`SessionConfig`] defines a session's behavior: pending-queue capacity and
//! enqueue patience, the connect timeout guarding dispatcher waits, what to do
//! when a producer fails, per-sequence buffering, and event bus capacity.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use sequin::{FailurePolicy, SessionConfig};
//!
//! let mut cfg = SessionConfig::default();
//! cfg.enqueue_timeout = Some(Duration::from_millis(250));
//! cfg.connect_timeout = Some(Duration::from_secs(30));
//! cfg.on_failure = FailurePolicy::Halt;
//!
//! assert_eq!(cfg.on_failure, FailurePolicy::Halt);
//! ```

use std::time::Duration;

/// Policy controlling what the session does after a producer fails.
///
/// - [`FailurePolicy::Continue`] the failure is reported and the queue keeps
///   draining (default).
/// - [`FailurePolicy::Halt`] the first failure cancels the session: queued
///   producers are disposed without connecting, exactly as on a connect
///   timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report the failure and keep connecting queued producers (default).
    Continue,
    /// Treat the first failure as fatal for the whole session.
    Halt,
}

impl Default for FailurePolicy {
    /// Returns [`FailurePolicy::Continue`].
    fn default() -> Self {
        FailurePolicy::Continue
    }
}

/// Configuration for one [`Session`](crate::Session).
///
/// Controls queue admission, dispatcher patience, failure handling, and event
/// plumbing.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Capacity of the pending queue (clamped to at least 1).
    pub queue_capacity: usize,
    /// How long `attach`/`seal` wait for queue space before giving up with
    /// `Saturated` (`None` = wait forever).
    pub enqueue_timeout: Option<Duration>,
    /// Upper bound on the dispatcher's wait for the next producer to connect
    /// or the running one to terminate; exceeding it cancels the session
    /// (`None` = unbounded).
    pub connect_timeout: Option<Duration>,
    /// What to do when a connected producer fails.
    pub on_failure: FailurePolicy,
    /// Per-sequence item buffer; emitters wait once it is full.
    pub emit_capacity: usize,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl Default for SessionConfig {
    /// Provides a default configuration:
    /// - `queue_capacity = 1 << 20` (effectively unbounded)
    /// - `enqueue_timeout = None` (wait forever)
    /// - `connect_timeout = None` (unbounded waits)
    /// - `on_failure = FailurePolicy::Continue`
    /// - `emit_capacity = 64`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            queue_capacity: 1 << 20,
            enqueue_timeout: None,
            connect_timeout: None,
            on_failure: FailurePolicy::default(),
            emit_capacity: 64,
            bus_capacity: 1024,
        }
    }
}
