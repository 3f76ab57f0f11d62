//! # The session handle: attach, seal, cancel.
//!
//! A [`Session`] is a cheap clone-able handle to one dispatcher task. All
//! mutation flows through channels; the handle itself holds no lifecycle
//! state beyond a read-only [`Phase`] watch.
//!
//! ## Rules
//! - `attach` enqueues an armed producer; its factory runs only when the
//!   dispatcher connects it, in attachment order.
//! - `seal` is all-or-nothing: either the shutdown marker lands at the end of
//!   the queue (later attaches are refused) or nothing changed at all.
//! - `cancel` hands back every producer that never got connected, in
//!   attachment order, still armed.
//! - Dropping every handle seals implicitly: queued producers finish, then
//!   the dispatcher exits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::builder::SessionBuilder;
use super::dispatcher::{Ctrl, Dispatcher, Phase, Queued};
use super::slot::{PendingProducer, prepare};
use crate::config::SessionConfig;
use crate::error::{SessionError, WorkError};
use crate::events::{Bus, Event, EventKind};
use crate::produce::{Emitter, Produce, ProduceFn, Sequence};

/// Handle to a sequential-execution session.
///
/// Producers attached to the same session run one at a time, in the order
/// they were attached, regardless of how fast each one finishes. Handles are
/// cheap to clone; all clones talk to the same dispatcher.
#[derive(Clone)]
pub struct Session {
    work: mpsc::Sender<Queued>,
    ctrl: mpsc::UnboundedSender<Ctrl>,
    phase: watch::Receiver<Phase>,
    bus: Bus,
    enqueue_timeout: Option<Duration>,
    emit_capacity: usize,
}

impl Session {
    /// Starts a session with its own event bus.
    pub fn new(config: SessionConfig) -> Self {
        let bus = Bus::new(config.bus_capacity);
        Self::with_bus(config, bus)
    }

    /// Starts configuring a session with attached subscribers.
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    pub(crate) fn with_bus(config: SessionConfig, bus: Bus) -> Self {
        let (work_tx, work_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(Phase::Open);
        Dispatcher::spawn(work_rx, ctrl_rx, phase_tx, bus.clone(), &config);
        Self {
            work: work_tx,
            ctrl: ctrl_tx,
            phase: phase_rx,
            bus,
            enqueue_timeout: config.enqueue_timeout,
            emit_capacity: config.emit_capacity,
        }
    }

    /// Attaches a producer built by `factory`.
    ///
    /// The factory is **not** called here: it runs on the producer's own task
    /// once the dispatcher connects it. Until then the producer sits armed in
    /// the queue, where [`cancel`](Session::cancel) can still reclaim it with
    /// the factory never invoked.
    ///
    /// Returns the [`Sequence`] of items the producer will emit once
    /// connected.
    ///
    /// # Errors
    /// - [`SessionError::Rejected`] after `seal` or `cancel`; the factory is
    ///   never invoked.
    /// - [`SessionError::Saturated`] when the queue stayed full past
    ///   [`SessionConfig::enqueue_timeout`].
    pub async fn attach<P, F>(
        &self,
        name: impl Into<Arc<str>>,
        factory: F,
    ) -> Result<Sequence<P::Item>, SessionError>
    where
        P: Produce,
        F: FnOnce() -> P + Send + 'static,
    {
        let name = name.into();
        let (slot, task, sequence) = prepare(name.clone(), factory, self.emit_capacity);
        match self.enqueue(Queued::Producer(slot)).await {
            Ok(()) => {
                tokio::spawn(task);
                self.bus
                    .publish(Event::new(EventKind::Attached).with_producer(name));
                Ok(sequence)
            }
            Err(EnqueueError::Timeout(waited)) => {
                self.bus.publish(
                    Event::new(EventKind::Saturated)
                        .with_producer(name)
                        .with_waited(waited),
                );
                Err(SessionError::Saturated { waited })
            }
            Err(EnqueueError::Closed) => {
                self.bus.publish(
                    Event::new(EventKind::ProducerRejected)
                        .with_producer(name)
                        .with_reason(self.refusal()),
                );
                Err(SessionError::Rejected)
            }
        }
    }

    /// [`attach`](Session::attach) for a plain closure producer.
    ///
    /// Sugar over [`ProduceFn`]: `f` is called with the emitter and the
    /// cancellation token when the producer connects.
    pub async fn attach_fn<T, F, Fut>(
        &self,
        name: impl Into<Arc<str>>,
        f: F,
    ) -> Result<Sequence<T>, SessionError>
    where
        T: Send + 'static,
        F: Fn(Emitter<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        self.attach(name, move || ProduceFn::new(f)).await
    }

    /// Seals the session: no further attachments, queued producers drain.
    ///
    /// Returns a [`Drain`] resolving `Ok(())` once every producer attached
    /// before the seal has terminated. Repeat calls are idempotent and hand
    /// out additional drain handles.
    ///
    /// # Errors
    /// - [`SessionError::Saturated`] when the shutdown marker could not be
    ///   enqueued within the timeout; the session stays open, nothing
    ///   changed.
    /// - [`SessionError::Rejected`] when the session was already cancelled.
    pub async fn seal(&self) -> Result<Drain, SessionError> {
        let (done_tx, done_rx) = oneshot::channel();
        match self.enqueue(Queued::Shutdown(done_tx)).await {
            Ok(()) => {
                // Close the queue behind the marker so later attaches fail
                // fast instead of queueing past it.
                let (ack_tx, ack_rx) = oneshot::channel();
                if self.ctrl.send(Ctrl::Sealed { ack: ack_tx }).is_ok() {
                    let _ = ack_rx.await;
                }
                Ok(Drain::new(done_rx))
            }
            Err(EnqueueError::Timeout(waited)) => {
                self.bus
                    .publish(Event::new(EventKind::Saturated).with_waited(waited));
                Err(SessionError::Saturated { waited })
            }
            Err(EnqueueError::Closed) => {
                if !matches!(self.phase(), Phase::Sealed) {
                    return Err(SessionError::Rejected);
                }
                // Already sealed elsewhere; just register one more waiter.
                let (tx, rx) = oneshot::channel();
                match self.ctrl.send(Ctrl::SealWaiter(tx)) {
                    Ok(()) => Ok(Drain::new(rx)),
                    // Dispatcher exited after a finished drain.
                    Err(_) => Ok(Drain::ready(Ok(()))),
                }
            }
        }
    }

    /// Cancels the session.
    ///
    /// Queued producers are never connected; they come back armed, in
    /// attachment order, with their factories never invoked. The currently
    /// connected producer (if any) only gets its token cancelled — whether it
    /// stops is up to it. Idempotent: repeat calls return an empty list.
    pub async fn cancel(&self) -> Vec<PendingProducer> {
        let (tx, rx) = oneshot::channel();
        if self.ctrl.send(Ctrl::Cancel { reply: tx }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Current lifecycle phase (snapshot; may advance immediately after).
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// The session's event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    fn refusal(&self) -> &'static str {
        match self.phase() {
            Phase::Canceled => "session cancelled",
            _ => "session sealed",
        }
    }

    async fn enqueue(&self, entry: Queued) -> Result<(), EnqueueError> {
        match self.enqueue_timeout {
            Some(limit) => match self.work.send_timeout(entry, limit).await {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(EnqueueError::Timeout(limit)),
                Err(SendTimeoutError::Closed(_)) => Err(EnqueueError::Closed),
            },
            None => self.work.send(entry).await.map_err(|_| EnqueueError::Closed),
        }
    }
}

enum EnqueueError {
    Timeout(Duration),
    Closed,
}

/// Handle returned by [`Session::seal`]; resolves when the drain finishes.
#[derive(Debug)]
pub struct Drain {
    rx: oneshot::Receiver<Result<(), SessionError>>,
}

impl Drain {
    pub(crate) fn new(rx: oneshot::Receiver<Result<(), SessionError>>) -> Self {
        Self { rx }
    }

    pub(crate) fn ready(result: Result<(), SessionError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Waits for the drain.
    ///
    /// `Ok(())` once every producer attached before the seal terminated;
    /// [`SessionError::Canceled`] when the session was cancelled first;
    /// [`SessionError::Interrupted`] when the dispatcher went away without
    /// answering.
    pub async fn wait(self) -> Result<(), SessionError> {
        self.rx.await.unwrap_or(Err(SessionError::Interrupted))
    }
}
