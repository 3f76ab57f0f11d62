//! # Deadline-bounded retries over shared attempts.
//!
//! A [`Retry`] wraps an in-flight [`Ticket`] together with a bounded budget of
//! fallback attempts. Attempts are memoized through a [`Memo`] keyed by
//! attempt index, so any number of concurrent [`Retry::get`] callers share the
//! same underlying executions — at most `1 + budget` attempts ever start.
//!
//! ## Rules
//! - **One deadline for everything**: `get(limit)` spends `limit` across the
//!   first result *and* all retries; the remaining budget is recomputed
//!   (floored at zero) before each attempt.
//! - **In-order attempts**: retry 0, then 1, … — never in parallel with each
//!   other from a single caller's perspective; concurrent callers simply join
//!   the attempt already under way.
//! - **Last failure wins**: once the deadline or the budget is spent, the most
//!   recent failure is re-raised unchanged; there is no dedicated
//!   "retries exhausted" error.
//! - **No retry for defects**: attempts stop early when the latest failure is
//!   not retryable ([`WorkError::is_retryable`]) — a `Bug`, `Canceled` or
//!   `Rejected` result repeats, so spending the budget on it is pointless.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::WorkError;
use crate::memo::Memo;
use crate::ticket::Ticket;

/// Bounded-retry view over a shared computation.
///
/// Cloning is intentionally absent: share a `Retry` behind an `Arc` the same
/// way the memo underneath is shared.
pub struct Retry<V> {
    first: Ticket<V>,
    attempts: Memo<u32, V>,
    budget: u32,
}

impl<V: Clone + Send + Sync + 'static> Retry<V> {
    /// Wraps `first` with up to `budget` fallback attempts.
    ///
    /// `factory(i)` builds the future for retry index `i` (0-based); it is
    /// invoked lazily, at most once per index across all callers.
    pub fn new<F, Fut>(first: Ticket<V>, budget: u32, factory: F) -> Self
    where
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, WorkError>> + Send + 'static,
    {
        Self {
            first,
            attempts: Memo::new(factory),
            budget,
        }
    }

    /// Maximum number of fallback attempts after the first result.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Waits up to `limit` for a successful result, retrying failures.
    ///
    /// Tries the first ticket, then retry 0, 1, … while the deadline and the
    /// budget allow, returning the first success. A `budget` of zero is a
    /// plain bounded wait on the first ticket. On exhaustion the most recent
    /// failure is returned; a timed-out attempt records
    /// [`WorkError::Timeout`] as that failure.
    pub async fn get(&self, limit: Duration) -> Result<V, WorkError> {
        let deadline = Instant::now() + limit;
        let mut last = match self.first.outcome_within(limit).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        for index in 0..self.budget {
            if !last.is_retryable() {
                break;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match tokio::time::timeout(left, self.attempts.value(&index)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => last = err,
                Err(_) => last = WorkError::Timeout { limit },
            }
        }
        Err(last)
    }
}
