//! # Producer abstraction and the emitter handed to it.
//!
//! This module defines the [`Produce`] trait (async, cancelable, item-emitting)
//! and the [`Emitter`] through which a producer pushes items to its observer.
//! The common handle type is [`ProduceRef`], an `Arc<dyn Produce>` suitable for
//! sharing.
//!
//! A producer receives a [`CancellationToken`] and should periodically check it
//! to stop cooperatively when the session cancels. Emission is backpressured:
//! `emit` waits while the observer's buffer is full, and reports
//! [`Disconnected`] once the observer dropped its [`Sequence`](crate::Sequence)
//! — a producer may treat that as a request to stop early.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::sequence::Emission;
use crate::error::WorkError;

/// The observer went away; further items have nowhere to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sequence observer disconnected")]
pub struct Disconnected;

/// Push side of one producer's item stream.
///
/// Cloneable so a producer can fan emission out to helper tasks it owns;
/// every clone feeds the same observer.
#[derive(Clone, Debug)]
pub struct Emitter<T> {
    tx: mpsc::Sender<Emission<T>>,
}

impl<T> Emitter<T> {
    pub(crate) fn new(tx: mpsc::Sender<Emission<T>>) -> Self {
        Self { tx }
    }

    /// Pushes one item to the observer.
    ///
    /// Waits while the observer's buffer is full. Fails with [`Disconnected`]
    /// once the observer dropped its sequence.
    pub async fn emit(&self, item: T) -> Result<(), Disconnected> {
        self.tx
            .send(Emission::Item(item))
            .await
            .map_err(|_| Disconnected)
    }

    /// Whether the observer already dropped its sequence.
    pub fn is_disconnected(&self) -> bool {
        self.tx.is_closed()
    }
}

/// # Asynchronous, cancelable item source.
///
/// A `Produce` implementation runs exactly once per attachment: it receives an
/// [`Emitter`] for its items and a [`CancellationToken`], emits zero or more
/// items, and terminates with a single `Result`. Implementors should regularly
/// check cancellation and exit promptly when the session cancels.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use sequin::{Emitter, Produce, WorkError};
///
/// struct Countdown;
///
/// #[async_trait]
/// impl Produce for Countdown {
///     type Item = u32;
///
///     async fn produce(&self, out: Emitter<u32>, ctx: CancellationToken) -> Result<(), WorkError> {
///         for n in (1..=3).rev() {
///             if ctx.is_cancelled() {
///                 return Ok(());
///             }
///             if out.emit(n).await.is_err() {
///                 // Nobody is listening anymore; stop early.
///                 return Ok(());
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Produce: Send + Sync + 'static {
    /// Type of the items this producer emits.
    type Item: Send + 'static;

    /// Runs the producer until it finishes, fails, or honors cancellation.
    async fn produce(
        &self,
        out: Emitter<Self::Item>,
        ctx: CancellationToken,
    ) -> Result<(), WorkError>;
}

/// Shared handle to a producer emitting `T`.
pub type ProduceRef<T> = std::sync::Arc<dyn Produce<Item = T>>;
