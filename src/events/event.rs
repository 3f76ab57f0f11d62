//! # Events emitted by sessions and workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Attachment events**: queue admission (attached, saturated, rejected)
//! - **Producer lifecycle events**: connect and terminal outcomes
//! - **Session terminal events**: sealing, draining, cancellation
//! - **Worker events**: background job failures and worker shutdown
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! producer names, reasons, and drained-entry counts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use sequin::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ProducerFailed)
//!     .with_producer("demo-producer")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::ProducerFailed);
//! assert_eq!(ev.producer.as_deref(), Some("demo-producer"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of session and worker events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Attachment events ===
    /// Producer accepted into the pending queue.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Attached,

    /// Enqueue gave up: the pending queue stayed full past the enqueue timeout.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `waited_ms`: how long the enqueue waited
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Saturated,

    /// Producer refused without being connected (sealed session, or queued
    /// behind the seal marker).
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `reason`: refusal detail
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ProducerRejected,

    // === Producer lifecycle events ===
    /// Producer reached the head of the queue; its factory runs now.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Connected,

    /// Connected producer finished successfully.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ProducerCompleted,

    /// Connected producer terminated with an error.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `reason`: failure message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ProducerFailed,

    /// Connected producer ended early after a cancellation request.
    ///
    /// Sets:
    /// - `producer`: producer name
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ProducerCanceled,

    // === Session terminal events ===
    /// Shutdown marker accepted; no further attachments will connect.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Sealed,

    /// Every producer attached before sealing has terminated.
    ///
    /// Sets:
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    Drained,

    /// The wait for a producer to connect or terminate exceeded the connect
    /// timeout; the session cancels itself.
    ///
    /// Sets:
    /// - `producer`: producer being waited on, if any
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    ConnectTimeout,

    /// The session stopped admitting and disposed its queue.
    ///
    /// Sets:
    /// - `reason`: what triggered the cancellation
    /// - `pending`: number of never-connected entries drained from the queue
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    SessionCanceled,

    // === Worker events ===
    /// Background job returned an error or panicked.
    ///
    /// Sets:
    /// - `producer`: worker name
    /// - `reason`: failure label and message
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    JobFailed,

    /// Worker thread ran its final task and terminated.
    ///
    /// Sets:
    /// - `producer`: worker name
    /// - `pending`: number of jobs rejected while draining the inbox
    /// - `at`: wall-clock timestamp
    /// - `seq`: global sequence
    WorkerStopped,
}

/// Session or worker event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Event classification.
    pub kind: EventKind,
    /// Name of the producer or worker, if applicable.
    pub producer: Option<Arc<str>>,
    /// Human-readable reason (errors, refusal details, etc.).
    pub reason: Option<Arc<str>>,
    /// How long a bounded wait lasted, in milliseconds (compact).
    pub waited_ms: Option<u32>,
    /// Count of queue entries affected by a terminal transition.
    pub pending: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            at: SystemTime::now(),
            producer: None,
            reason: None,
            waited_ms: None,
            pending: None,
        }
    }

    /// Attaches a producer (or worker) name.
    #[inline]
    pub fn with_producer(mut self, producer: impl Into<Arc<str>>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a wait duration (stored as milliseconds).
    #[inline]
    pub fn with_waited(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.waited_ms = Some(ms);
        self
    }

    /// Attaches an affected-entry count.
    #[inline]
    pub fn with_pending(mut self, n: u32) -> Self {
        self.pending = Some(n);
        self
    }
}
