//! # Shareable handles to one eventual result.
//!
//! A [`Ticket`] is a cloneable handle to a single asynchronous computation.
//! The computation runs (at most) once; every clone observes the same
//! `Result<V, WorkError>`, cached after first completion.
//!
//! ## Rules
//! - **Compute once**: clones share one underlying future via
//!   [`futures::future::Shared`]; awaiting an already-finished ticket returns
//!   the cached result immediately.
//! - **Eager vs lazy**: [`Ticket::spawn`] starts the work on the runtime right
//!   away; [`Ticket::lazy`] defers until the first awaiter polls;
//!   [`Ticket::ready`] wraps an already-known result.
//! - **Bounded waits**: [`Ticket::outcome_within`] gives up after a limit with
//!   [`WorkError::Timeout`] without disturbing the computation — later calls
//!   can still succeed.
//! - **Failure mapping**: a panicking spawned computation surfaces as
//!   [`WorkError::Bug`]; a computation dropped before completion surfaces as
//!   [`WorkError::Canceled`].

use std::future::Future;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

use crate::error::{WorkError, panic_message};

/// Cloneable, cached handle to one eventual `Result<V, WorkError>`.
///
/// Obtained from [`Worker::submit`](crate::Worker::submit),
/// [`Memo::get`](crate::Memo::get), or built directly from a future.
pub struct Ticket<V> {
    inner: Shared<BoxFuture<'static, Result<V, WorkError>>>,
}

impl<V> Clone for Ticket<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> std::fmt::Debug for Ticket<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("resolved", &self.inner.peek().is_some())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> Ticket<V> {
    /// Starts `future` on the runtime immediately and returns its handle.
    ///
    /// The work proceeds even if the ticket is never awaited. A panic inside
    /// the future resolves the ticket to [`WorkError::Bug`]; an aborted
    /// runtime task resolves it to [`WorkError::Canceled`].
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<V, WorkError>> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let fut = async move {
            match handle.await {
                Ok(res) => res,
                Err(err) => {
                    if err.is_panic() {
                        Err(WorkError::Bug {
                            message: panic_message(err.into_panic().as_ref()),
                        })
                    } else {
                        Err(WorkError::Canceled)
                    }
                }
            }
        };
        Self {
            inner: fut.boxed().shared(),
        }
    }

    /// Wraps `future` without starting it; the first awaiter drives it.
    ///
    /// All clones still share a single execution once polling begins.
    pub fn lazy<F>(future: F) -> Self
    where
        F: Future<Output = Result<V, WorkError>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// Wraps an already-known result.
    pub fn ready(result: Result<V, WorkError>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed().shared(),
        }
    }

    /// Adopts the receiving half of a oneshot channel.
    ///
    /// A sender dropped without sending resolves the ticket to
    /// [`WorkError::Canceled`].
    pub fn from_oneshot(rx: oneshot::Receiver<Result<V, WorkError>>) -> Self {
        let fut = async move {
            match rx.await {
                Ok(res) => res,
                Err(_) => Err(WorkError::Canceled),
            }
        };
        Self {
            inner: fut.boxed().shared(),
        }
    }

    /// Waits for the result, however long it takes.
    pub async fn outcome(&self) -> Result<V, WorkError> {
        self.inner.clone().await
    }

    /// Waits for the result up to `limit`.
    ///
    /// On expiry returns [`WorkError::Timeout`] and leaves the computation
    /// untouched; a later `outcome()` call can still observe success.
    pub async fn outcome_within(&self, limit: Duration) -> Result<V, WorkError> {
        match tokio::time::timeout(limit, self.inner.clone()).await {
            Ok(res) => res,
            Err(_) => Err(WorkError::Timeout { limit }),
        }
    }

    /// Returns the cached result if the computation already finished.
    pub fn try_outcome(&self) -> Option<Result<V, WorkError>> {
        self.inner.peek().cloned()
    }
}
