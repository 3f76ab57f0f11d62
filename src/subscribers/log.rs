//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] forwards every event to `tracing`, one line per event.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format (with a fmt subscriber installed)
//! ```text
//!  INFO sequin: attached producer=Some("p1")
//!  INFO sequin: connected producer=Some("p1")
//!  WARN sequin: producer failed producer=Some("p1") reason=Some("boom")
//!  INFO sequin: sealed
//!  INFO sequin: drained
//! ```
//!
//! ## Example
//! ```no_run
//! use sequin::{LogWriter, Session, SessionConfig};
//!
//! let session = Session::builder(SessionConfig::default())
//!     .with_subscriber(LogWriter::new())
//!     .build();
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event-to-log subscriber.
///
/// Enabled via the `logging` feature. Emits one `tracing` line per event for
/// debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::Attached => {
                info!(producer = ?e.producer, "attached");
            }
            EventKind::Connected => {
                info!(producer = ?e.producer, "connected");
            }
            EventKind::ProducerCompleted => {
                info!(producer = ?e.producer, "producer completed");
            }
            EventKind::ProducerCanceled => {
                info!(producer = ?e.producer, "producer cancelled");
            }
            EventKind::ProducerFailed => {
                warn!(producer = ?e.producer, reason = ?e.reason, "producer failed");
            }
            EventKind::ProducerRejected => {
                warn!(producer = ?e.producer, reason = ?e.reason, "producer rejected");
            }
            EventKind::Saturated => {
                warn!(producer = ?e.producer, waited_ms = ?e.waited_ms, "queue saturated");
            }
            EventKind::Sealed => {
                info!("sealed");
            }
            EventKind::Drained => {
                info!("drained");
            }
            EventKind::ConnectTimeout => {
                warn!(producer = ?e.producer, waited_ms = ?e.waited_ms, "connect timed out");
            }
            EventKind::SessionCanceled => {
                warn!(reason = ?e.reason, pending = ?e.pending, "session cancelled");
            }
            EventKind::JobFailed => {
                warn!(worker = ?e.producer, reason = ?e.reason, "job failed");
            }
            EventKind::WorkerStopped => {
                info!(worker = ?e.producer, rejected = ?e.pending, "worker stopped");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
