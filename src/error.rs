//! Error types used by the session machinery and submitted work.
//!
//! This module defines two main error enums:
//!
//! - [`SessionError`] — errors raised by the scheduling surface itself
//!   (attach/seal/cancel and their waits).
//! - [`WorkError`] — errors raised by the work being executed: producers,
//!   worker jobs, cached computations and retries.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and additional utilities such as [`WorkError::is_retryable`].

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the scheduling surface.
///
/// These represent failures of session operations, not of the work itself:
/// an attach refused after sealing, a full pending queue, or a wait that
/// ended abnormally.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// The session no longer accepts work (sealed or cancelled).
    #[error("session no longer accepts work")]
    Rejected,

    /// The pending queue stayed full for the whole enqueue timeout.
    #[error("pending queue full; gave up after {waited:?}")]
    Saturated {
        /// How long the enqueue waited before giving up.
        waited: Duration,
    },

    /// The wait for the next producer to connect or terminate exceeded its limit.
    #[error("connect wait exceeded {limit:?}")]
    ConnectTimeout {
        /// The configured connect timeout.
        limit: Duration,
    },

    /// A wait was severed before an answer arrived (the session ended mid-wait).
    #[error("wait interrupted: session ended")]
    Interrupted,

    /// The session was cancelled while the caller was waiting on it.
    #[error("session cancelled")]
    Canceled,
}

impl SessionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use sequin::SessionError;
    /// use std::time::Duration;
    ///
    /// let err = SessionError::Saturated { waited: Duration::from_millis(50) };
    /// assert_eq!(err.as_label(), "session_saturated");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SessionError::Rejected => "session_rejected",
            SessionError::Saturated { .. } => "session_saturated",
            SessionError::ConnectTimeout { .. } => "session_connect_timeout",
            SessionError::Interrupted => "session_interrupted",
            SessionError::Canceled => "session_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SessionError::Rejected => "rejected: session closed to new work".to_string(),
            SessionError::Saturated { waited } => format!("saturated after {waited:?}"),
            SessionError::ConnectTimeout { limit } => format!("connect timeout: {limit:?}"),
            SessionError::Interrupted => "interrupted".to_string(),
            SessionError::Canceled => "session cancelled".to_string(),
        }
    }
}

/// # Errors produced by executed work.
///
/// These represent failures of the work a caller handed over: a producer run,
/// a worker job, a cached computation or a retry chain. Some errors are
/// retryable (`Middleware`, `Timeout`), others are considered final.
///
/// The type is `Clone` because one outcome is typically observed through many
/// handle clones; the `Middleware` cause is therefore kept behind an `Arc`.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum WorkError {
    /// Operational failure signalled by the work itself (an `Err` return).
    #[error("operational failure: {source}")]
    Middleware {
        /// The underlying cause, preserved for `source()` chains.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Defect in the submitted work (a panic or a broken internal contract).
    #[error("defect in submitted work: {message}")]
    Bug {
        /// The panic payload or contract violation, as text.
        message: String,
    },

    /// The work did not finish within its allotted time.
    #[error("timed out after {limit:?}")]
    Timeout {
        /// The time limit that was exceeded.
        limit: Duration,
    },

    /// The work was cancelled before producing a result.
    #[error("work cancelled")]
    Canceled,

    /// The work was refused outright: its executor had already stopped.
    #[error("work rejected: executor stopped")]
    Rejected,
}

impl WorkError {
    /// Wraps any error as an operational (`Middleware`) failure.
    ///
    /// # Example
    /// ```
    /// use sequin::WorkError;
    ///
    /// let err = WorkError::middleware("connection reset");
    /// assert_eq!(err.as_label(), "work_middleware");
    /// ```
    pub fn middleware(err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>) -> Self {
        WorkError::Middleware {
            source: Arc::from(err.into()),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use sequin::WorkError;
    /// use std::time::Duration;
    ///
    /// let err = WorkError::Timeout { limit: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "work_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Middleware { .. } => "work_middleware",
            WorkError::Bug { .. } => "work_bug",
            WorkError::Timeout { .. } => "work_timeout",
            WorkError::Canceled => "work_canceled",
            WorkError::Rejected => "work_rejected",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            WorkError::Middleware { source } => format!("middleware: {source}"),
            WorkError::Bug { message } => format!("bug: {message}"),
            WorkError::Timeout { limit } => format!("timeout: {limit:?}"),
            WorkError::Canceled => "cancelled".to_string(),
            WorkError::Rejected => "rejected".to_string(),
        }
    }

    /// Indicates whether the error type is safe to retry.
    ///
    /// Returns `true` for [`WorkError::Middleware`] and [`WorkError::Timeout`],
    /// `false` otherwise: defects repeat, and cancelled or rejected work was
    /// refused deliberately.
    ///
    /// # Example
    /// ```
    /// use sequin::WorkError;
    ///
    /// let retryable = WorkError::middleware("flaky upstream");
    /// assert!(retryable.is_retryable()); // true
    ///
    /// let defect = WorkError::Bug { message: "index out of range".into() };
    /// assert!(!defect.is_retryable()); // false
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkError::Middleware { .. } | WorkError::Timeout { .. }
        )
    }
}

/// Renders a panic payload as text for [`WorkError::Bug`] and log lines.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_labels_are_stable() {
        assert_eq!(SessionError::Rejected.as_label(), "session_rejected");
        assert_eq!(SessionError::Interrupted.as_label(), "session_interrupted");
        assert_eq!(SessionError::Canceled.as_label(), "session_canceled");
        let sat = SessionError::Saturated {
            waited: Duration::from_millis(10),
        };
        assert_eq!(sat.as_label(), "session_saturated");
    }

    #[test]
    fn test_work_error_retryability() {
        assert!(WorkError::middleware("io").is_retryable());
        assert!(WorkError::Timeout {
            limit: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!WorkError::Canceled.is_retryable());
        assert!(!WorkError::Rejected.is_retryable());
        assert!(!WorkError::Bug {
            message: "oops".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_middleware_preserves_source() {
        let err = WorkError::middleware(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("reset by peer"));
    }

    #[test]
    fn test_panic_message_extracts_text() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&17_u32), "panic with non-string payload");
    }
}
