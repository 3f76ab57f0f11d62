//! # Armed producers and their connect gate.
//!
//! `attach` does not run a producer; it *arms* one. Arming builds the
//! cancellation token and the item channel up front, wires a one-shot connect
//! gate in between, and hands the session a [`Slot`] while the caller keeps
//! the [`Sequence`](crate::Sequence). The factory is only invoked once the
//! gate resolves to *connect* — a producer disposed or rejected while pending
//! never observes any side effect of its own creation.
//!
//! ```text
//!   attach ──► Slot { PendingProducer, done } ──► dispatcher
//!                     │ verdict gate                  │ connect / reject / dispose
//!                     ▼                               ▼
//!              producer task ── items ──► Sequence   done ──► dispatcher advances
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::produce::{Emission, Emitter, Outcome, Produce, Sequence};

/// Decision delivered through a pending producer's connect gate.
pub(crate) enum Verdict {
    Connect,
    Reject,
}

/// An armed producer that has not been connected yet.
///
/// Returned by [`Session::cancel`](crate::Session::cancel) for every queue
/// entry that never ran. The factory has not been invoked; the caller may
/// [`connect`](PendingProducer::connect) it manually (outside any session) or
/// drop it to dispose it, which ends its sequence with
/// [`Outcome::Canceled`].
pub struct PendingProducer {
    pub(crate) name: Arc<str>,
    pub(crate) verdict: oneshot::Sender<Verdict>,
    pub(crate) token: CancellationToken,
}

impl PendingProducer {
    /// Name the producer was attached under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancellation token shared with the producer task and its sequence.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Releases the producer outside the session.
    ///
    /// Its factory runs and items flow to the original sequence as usual,
    /// but no dispatcher serializes it against anything else.
    pub fn connect(self) {
        let _ = self.verdict.send(Verdict::Connect);
    }
}

impl std::fmt::Debug for PendingProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingProducer")
            .field("name", &self.name)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Queue entry for one attachment: the armed producer plus the dispatcher's
/// view of its termination.
pub(crate) struct Slot {
    pub(crate) producer: PendingProducer,
    pub(crate) done: oneshot::Receiver<Outcome>,
}

impl Slot {
    pub(crate) fn name(&self) -> Arc<str> {
        self.producer.name.clone()
    }

    /// Opens the gate; the factory runs now.
    pub(crate) fn connect(self) -> RunningProducer {
        let Slot { producer, done } = self;
        let PendingProducer {
            name,
            verdict,
            token,
        } = producer;
        let _ = verdict.send(Verdict::Connect);
        RunningProducer { name, token, done }
    }

    /// Refuses the producer: its sequence ends [`Outcome::Rejected`] and the
    /// factory is never invoked.
    pub(crate) fn reject(self) {
        let _ = self.producer.verdict.send(Verdict::Reject);
    }

    /// Disposes the producer: its sequence ends [`Outcome::Canceled`] and the
    /// factory is never invoked.
    pub(crate) fn dispose(self) {
        self.producer.token.cancel();
        // Dropping the verdict sender resolves the gate.
    }

    /// Detaches the armed producer for hand-back to the caller.
    pub(crate) fn into_pending(self) -> PendingProducer {
        self.producer
    }
}

/// A producer the dispatcher has connected and now waits on.
pub(crate) struct RunningProducer {
    pub(crate) name: Arc<str>,
    pub(crate) token: CancellationToken,
    pub(crate) done: oneshot::Receiver<Outcome>,
}

/// Builds the armed slot, the (not yet spawned) producer task, and the
/// caller's sequence.
pub(crate) fn prepare<P, F>(
    name: Arc<str>,
    factory: F,
    emit_capacity: usize,
) -> (
    Slot,
    impl Future<Output = ()> + Send + 'static,
    Sequence<P::Item>,
)
where
    P: Produce,
    F: FnOnce() -> P + Send + 'static,
{
    let (verdict_tx, verdict_rx) = oneshot::channel::<Verdict>();
    let (done_tx, done_rx) = oneshot::channel::<Outcome>();
    let (emit_tx, emit_rx) = mpsc::channel::<Emission<P::Item>>(emit_capacity.max(1));
    let token = CancellationToken::new();

    let slot = Slot {
        producer: PendingProducer {
            name: name.clone(),
            verdict: verdict_tx,
            token: token.clone(),
        },
        done: done_rx,
    };
    let sequence = Sequence::new(name, emit_rx, token.clone());

    let task = async move {
        let outcome = match verdict_rx.await {
            Ok(Verdict::Connect) => run_connected(factory, &emit_tx, &token).await,
            Ok(Verdict::Reject) => Outcome::Rejected,
            Err(_) => Outcome::Canceled,
        };
        // Report termination first: the session advances on `done`, not on
        // how fast the observer drains its items.
        let _ = done_tx.send(outcome.clone());
        let _ = emit_tx.send(Emission::End(outcome)).await;
    };

    (slot, task, sequence)
}

async fn run_connected<P, F>(
    factory: F,
    emit_tx: &mpsc::Sender<Emission<P::Item>>,
    token: &CancellationToken,
) -> Outcome
where
    P: Produce,
    F: FnOnce() -> P,
{
    // A cancel that raced the connect wins; the factory stays uninvoked.
    if token.is_cancelled() {
        return Outcome::Canceled;
    }
    let producer = factory();
    let out = Emitter::new(emit_tx.clone());
    // Cancellation wins when both are ready.
    tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Canceled,
        res = producer.produce(out, token.clone()) => match res {
            Ok(()) => Outcome::Completed,
            Err(err) => Outcome::Failed(err),
        },
    }
}
