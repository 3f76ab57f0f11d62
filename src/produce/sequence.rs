//! # Observer side of one attached producer.
//!
//! [`Session::attach`](crate::Session::attach) returns a [`Sequence`]: the
//! stream of items a producer emits, followed by exactly one terminal
//! [`Outcome`]. Consumption is decoupled from scheduling — the session moves
//! on to the next producer when the previous one *terminates*, not when its
//! items have been read.
//!
//! ## Rules
//! - **Exactly one terminal**: after [`Sequence::next`] returns `None`,
//!   [`Sequence::outcome`] is always `Some`.
//! - **Dropping does not cancel**: a producer keeps running fire-and-forget
//!   when its sequence is dropped; it merely observes a disconnected
//!   [`Emitter`](crate::Emitter) and may stop early. Call
//!   [`Sequence::cancel`] for an explicit early-termination request.
//! - **A vanished producer is a defect**: if the producer task dies without
//!   reporting (e.g. its factory panicked), the terminal is
//!   `Failed(WorkError::Bug)`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorkError;

/// One element of a producer's stream: an item, or the terminal outcome.
pub(crate) enum Emission<T> {
    Item(T),
    End(Outcome),
}

/// How an attached producer ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The producer finished successfully.
    Completed,
    /// The producer terminated with an error.
    Failed(WorkError),
    /// The producer ended after a cancellation request (its factory may never
    /// have been invoked).
    Canceled,
    /// The producer was refused: it was attached after the session sealed.
    Rejected,
}

impl Outcome {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Failed(_) => "failed",
            Outcome::Canceled => "canceled",
            Outcome::Rejected => "rejected",
        }
    }

    /// Whether the producer finished successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }

    /// The failure, if the producer terminated with one.
    pub fn error(&self) -> Option<&WorkError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Collapses the outcome into a `Result`, mapping `Canceled` and
    /// `Rejected` onto their [`WorkError`] counterparts.
    pub fn into_result(self) -> Result<(), WorkError> {
        match self {
            Outcome::Completed => Ok(()),
            Outcome::Failed(err) => Err(err),
            Outcome::Canceled => Err(WorkError::Canceled),
            Outcome::Rejected => Err(WorkError::Rejected),
        }
    }
}

/// Items and terminal outcome of one attached producer.
pub struct Sequence<T> {
    name: Arc<str>,
    rx: mpsc::Receiver<Emission<T>>,
    token: CancellationToken,
    outcome: Option<Outcome>,
}

impl<T> Sequence<T> {
    pub(crate) fn new(
        name: Arc<str>,
        rx: mpsc::Receiver<Emission<T>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            name,
            rx,
            token,
            outcome: None,
        }
    }

    /// Name the producer was attached under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the next item; `None` once the producer terminated.
    pub async fn next(&mut self) -> Option<T> {
        if self.outcome.is_some() {
            return None;
        }
        match self.rx.recv().await {
            Some(Emission::Item(item)) => Some(item),
            Some(Emission::End(outcome)) => {
                self.outcome = Some(outcome);
                None
            }
            None => {
                self.outcome = Some(Outcome::Failed(WorkError::Bug {
                    message: "producer task ended without reporting an outcome".into(),
                }));
                None
            }
        }
    }

    /// Terminal outcome, available once [`Sequence::next`] returned `None`.
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Discards remaining items and waits for the terminal outcome.
    pub async fn wait(mut self) -> Outcome {
        while self.next().await.is_some() {}
        match self.outcome.take() {
            Some(outcome) => outcome,
            None => Outcome::Failed(WorkError::Bug {
                message: "sequence ended without an outcome".into(),
            }),
        }
    }

    /// Requests early termination of this producer.
    ///
    /// Best-effort: a connected producer observes its token at the next
    /// checkpoint; a still-pending producer is disposed without ever invoking
    /// its factory.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wired(capacity: usize) -> (mpsc::Sender<Emission<u32>>, Sequence<u32>) {
        let (tx, rx) = mpsc::channel(capacity);
        let seq = Sequence::new(Arc::from("test"), rx, CancellationToken::new());
        (tx, seq)
    }

    #[tokio::test]
    async fn test_items_then_terminal() {
        let (tx, mut seq) = wired(4);
        tx.send(Emission::Item(1)).await.unwrap();
        tx.send(Emission::Item(2)).await.unwrap();
        tx.send(Emission::End(Outcome::Completed)).await.unwrap();

        assert!(seq.outcome().is_none());
        assert_eq!(seq.next().await, Some(1));
        assert_eq!(seq.next().await, Some(2));
        assert_eq!(seq.next().await, None);
        assert!(seq.outcome().is_some_and(Outcome::is_completed));
        // Terminal is sticky.
        assert_eq!(seq.next().await, None);
    }

    #[tokio::test]
    async fn test_missing_terminal_is_a_bug() {
        let (tx, mut seq) = wired(4);
        tx.send(Emission::Item(7)).await.unwrap();
        drop(tx);

        assert_eq!(seq.next().await, Some(7));
        assert_eq!(seq.next().await, None);
        match seq.outcome() {
            Some(Outcome::Failed(WorkError::Bug { .. })) => {}
            other => panic!("expected bug outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wait_discards_items() {
        let (tx, seq) = wired(8);
        for i in 0..5 {
            tx.send(Emission::Item(i)).await.unwrap();
        }
        tx.send(Emission::End(Outcome::Failed(WorkError::middleware("late failure"))))
            .await
            .unwrap();

        let outcome = seq.wait().await;
        assert_eq!(outcome.as_label(), "failed");
        assert!(outcome.error().is_some());
        assert!(outcome.into_result().is_err());
    }
}
