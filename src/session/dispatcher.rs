//! # The dispatcher task: single owner of the queue and the lifecycle.
//!
//! One dispatcher runs per session. It is the only code that dequeues, the
//! only code that connects producers, and the only writer of the session's
//! [`Phase`] — every state transition happens inside its loop, driven by
//! messages rather than callbacks.
//!
//! ```text
//!            work queue (bounded)            ctrl (unbounded, priority)
//!   attach ──► Producer(slot) ──┐      seal ──► Sealed / SealWaiter ──┐
//!   seal   ──► Shutdown(ack) ───┤    cancel ──► Cancel{reply} ────────┤
//!                               ▼                                     ▼
//!                         ┌─────────────────────────────────────────────┐
//!                         │ loop: serve ctrl; dequeue; connect; wait on │
//!                         │ `done`; publish events; advance             │
//!                         └─────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - **Strict order**: at most one producer is connected at a time, in
//!   attachment order; the next connect waits for the previous `done`.
//! - **Control beats work**: seal acknowledgement and cancellation are
//!   serviced between polls of the queue (`biased` select), never reentrantly.
//! - **Bounded patience**: with a connect timeout configured, both the idle
//!   wait for the next entry and the wait for a running producer's
//!   termination are bounded; exceeding either cancels the session.
//! - **Terminal sweeps**: on exit the dispatcher empties both channels so no
//!   waiter is left hanging — stragglers are rejected (after a drain) or
//!   disposed/returned (after a cancel), late control messages are answered
//!   from the terminal phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};

use super::slot::{PendingProducer, RunningProducer, Slot};
use crate::config::{FailurePolicy, SessionConfig};
use crate::error::{SessionError, WorkError};
use crate::events::{Bus, Event, EventKind};
use crate::produce::Outcome;

/// Lifecycle of a session, owned by its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting attachments.
    Open,
    /// Queue closed; draining what was attached before the seal (terminal
    /// once the drain finishes).
    Sealed,
    /// Cancelled; queued producers were disposed or handed back.
    Canceled,
}

impl Phase {
    /// Whether attachments are still being accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Phase::Open)
    }
}

/// Work queue entries.
pub(crate) enum Queued {
    Producer(Slot),
    /// Seal marker: everything ahead of it drains, everything behind it is
    /// refused. Carries the drain waiter.
    Shutdown(oneshot::Sender<Result<(), SessionError>>),
}

/// Control-plane messages, serviced with priority over the queue.
pub(crate) enum Ctrl {
    /// The seal marker was enqueued; close the queue and acknowledge.
    Sealed { ack: oneshot::Sender<()> },
    /// Additional drain waiter (repeat `seal()` calls).
    SealWaiter(oneshot::Sender<Result<(), SessionError>>),
    /// Cancel; reply with the never-connected producers in attachment order.
    Cancel {
        reply: oneshot::Sender<Vec<PendingProducer>>,
    },
}

enum Exit {
    /// Seal marker reached, or every session handle dropped.
    Drained,
    /// Explicit cancel.
    Canceled {
        reply: oneshot::Sender<Vec<PendingProducer>>,
    },
    /// Connect timeout: while idle (`producer: None`) or while waiting on a
    /// running producer.
    TimedOut { producer: Option<Arc<str>> },
    /// [`FailurePolicy::Halt`] tripped on a failed producer.
    Halted { producer: Arc<str> },
}

pub(crate) struct Dispatcher {
    work_rx: mpsc::Receiver<Queued>,
    ctrl_rx: mpsc::UnboundedReceiver<Ctrl>,
    phase: watch::Sender<Phase>,
    bus: Bus,
    connect_timeout: Option<Duration>,
    on_failure: FailurePolicy,
    waiters: Vec<oneshot::Sender<Result<(), SessionError>>>,
}

impl Dispatcher {
    pub(crate) fn spawn(
        work_rx: mpsc::Receiver<Queued>,
        ctrl_rx: mpsc::UnboundedReceiver<Ctrl>,
        phase: watch::Sender<Phase>,
        bus: Bus,
        config: &SessionConfig,
    ) {
        let dispatcher = Self {
            work_rx,
            ctrl_rx,
            phase,
            bus,
            connect_timeout: config.connect_timeout,
            on_failure: config.on_failure,
            waiters: Vec::new(),
        };
        tokio::spawn(dispatcher.run());
    }

    async fn run(mut self) {
        let exit = 'queue: loop {
            // Idle: wait for the next queue entry, serving control first.
            let deadline = self.deadline();
            let entry = loop {
                tokio::select! {
                    biased;
                    Some(ctrl) = self.ctrl_rx.recv() => {
                        if let Some(exit) = self.on_ctrl(ctrl) {
                            break 'queue exit;
                        }
                    }
                    entry = self.work_rx.recv() => match entry {
                        Some(entry) => break entry,
                        // Every handle dropped; nothing can arrive anymore.
                        None => break 'queue Exit::Drained,
                    },
                    _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                        break 'queue Exit::TimedOut { producer: None };
                    }
                }
            };

            let slot = match entry {
                Queued::Shutdown(waiter) => {
                    self.waiters.push(waiter);
                    break 'queue Exit::Drained;
                }
                Queued::Producer(slot) => slot,
            };

            let mut running = slot.connect();
            self.bus.publish(
                Event::new(EventKind::Connected).with_producer(running.name.clone()),
            );

            // Connected: wait for termination, still serving control.
            let deadline = self.deadline();
            let ended = loop {
                tokio::select! {
                    biased;
                    Some(ctrl) = self.ctrl_rx.recv() => {
                        if let Some(exit) = self.on_ctrl(ctrl) {
                            break Some(exit);
                        }
                    }
                    done = &mut running.done => {
                        let outcome = match done {
                            Ok(outcome) => outcome,
                            // The producer task died without reporting.
                            Err(_) => Outcome::Failed(WorkError::Bug {
                                message: "producer task ended without reporting an outcome"
                                    .into(),
                            }),
                        };
                        break self.on_outcome(&running, outcome);
                    }
                    _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                        break Some(Exit::TimedOut {
                            producer: Some(running.name.clone()),
                        });
                    }
                }
            };

            if let Some(exit) = ended {
                // Best-effort forwarded cancellation of whatever still runs.
                running.token.cancel();
                break 'queue exit;
            }
        };

        self.finish(exit);
    }

    fn deadline(&self) -> Option<Instant> {
        self.connect_timeout.map(|limit| Instant::now() + limit)
    }

    fn on_ctrl(&mut self, ctrl: Ctrl) -> Option<Exit> {
        match ctrl {
            Ctrl::Sealed { ack } => {
                if self.phase.borrow().is_open() {
                    let _ = self.phase.send_replace(Phase::Sealed);
                    self.bus.publish(Event::new(EventKind::Sealed));
                }
                // Stops new sends; buffered entries (incl. the marker) drain.
                self.work_rx.close();
                let _ = ack.send(());
                None
            }
            Ctrl::SealWaiter(waiter) => {
                self.waiters.push(waiter);
                None
            }
            Ctrl::Cancel { reply } => Some(Exit::Canceled { reply }),
        }
    }

    fn on_outcome(&self, running: &RunningProducer, outcome: Outcome) -> Option<Exit> {
        let name = running.name.clone();
        match &outcome {
            Outcome::Completed => self
                .bus
                .publish(Event::new(EventKind::ProducerCompleted).with_producer(name)),
            Outcome::Failed(err) => self.bus.publish(
                Event::new(EventKind::ProducerFailed)
                    .with_producer(name)
                    .with_reason(err.as_message()),
            ),
            Outcome::Canceled => self
                .bus
                .publish(Event::new(EventKind::ProducerCanceled).with_producer(name)),
            Outcome::Rejected => self
                .bus
                .publish(Event::new(EventKind::ProducerRejected).with_producer(name)),
        }
        if matches!(outcome, Outcome::Failed(_)) && self.on_failure == FailurePolicy::Halt {
            return Some(Exit::Halted {
                producer: running.name.clone(),
            });
        }
        None
    }

    fn finish(mut self, exit: Exit) {
        match exit {
            Exit::Drained => {
                let _ = self.phase.send_replace(Phase::Sealed);
                self.reject_stragglers();
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.bus.publish(Event::new(EventKind::Drained));
            }
            Exit::TimedOut { producer } => {
                let limit = self.connect_timeout.unwrap_or_default();
                let (_, names) = self.cancel_queue(false);
                tracing::warn!(
                    producer = ?producer,
                    limit = ?limit,
                    disposed = ?names,
                    "connect wait exceeded; session cancelled"
                );
                let mut ev = Event::new(EventKind::ConnectTimeout).with_waited(limit);
                if let Some(name) = &producer {
                    ev = ev.with_producer(name.clone());
                }
                self.bus.publish(ev);
                self.publish_canceled("connect timeout", names.len() as u32);
            }
            Exit::Halted { producer } => {
                let (_, names) = self.cancel_queue(false);
                tracing::warn!(
                    producer = %producer,
                    disposed = ?names,
                    "producer failure halted the session"
                );
                self.publish_canceled(
                    format!("halted after failure of {producer}"),
                    names.len() as u32,
                );
            }
            Exit::Canceled { reply } => {
                let (kept, _) = self.cancel_queue(true);
                self.publish_canceled("cancel requested", kept.len() as u32);
                let _ = reply.send(kept);
            }
        }
        self.sweep_ctrl();
    }

    /// Rejects producers that raced their enqueue past the seal marker and
    /// adopts any extra markers as drain waiters.
    fn reject_stragglers(&mut self) {
        self.work_rx.close();
        while let Ok(entry) = self.work_rx.try_recv() {
            match entry {
                Queued::Producer(slot) => {
                    self.bus.publish(
                        Event::new(EventKind::ProducerRejected)
                            .with_producer(slot.name())
                            .with_reason("attached after seal"),
                    );
                    slot.reject();
                }
                Queued::Shutdown(waiter) => self.waiters.push(waiter),
            }
        }
    }

    /// Empties the queue on cancellation. Never-connected producers are
    /// either kept for hand-back (`keep`) or disposed; drain waiters resolve
    /// `Canceled` either way. Returns the kept producers and all drained
    /// names, both in attachment order.
    fn cancel_queue(&mut self, keep: bool) -> (Vec<PendingProducer>, Vec<Arc<str>>) {
        let _ = self.phase.send_replace(Phase::Canceled);
        self.work_rx.close();
        let mut kept = Vec::new();
        let mut names = Vec::new();
        while let Ok(entry) = self.work_rx.try_recv() {
            match entry {
                Queued::Producer(slot) => {
                    names.push(slot.name());
                    if keep {
                        kept.push(slot.into_pending());
                    } else {
                        slot.dispose();
                    }
                }
                Queued::Shutdown(waiter) => self.waiters.push(waiter),
            }
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(SessionError::Canceled));
        }
        (kept, names)
    }

    fn publish_canceled(&self, reason: impl Into<Arc<str>>, pending: u32) {
        self.bus.publish(
            Event::new(EventKind::SessionCanceled)
                .with_reason(reason)
                .with_pending(pending),
        );
    }

    /// Answers control messages that arrived after the loop decided to exit.
    fn sweep_ctrl(&mut self) {
        self.ctrl_rx.close();
        let terminal = *self.phase.borrow();
        while let Ok(ctrl) = self.ctrl_rx.try_recv() {
            match ctrl {
                Ctrl::Sealed { ack } => {
                    let _ = ack.send(());
                }
                Ctrl::SealWaiter(waiter) => {
                    let _ = waiter.send(match terminal {
                        Phase::Canceled => Err(SessionError::Canceled),
                        _ => Ok(()),
                    });
                }
                Ctrl::Cancel { reply } => {
                    let _ = reply.send(Vec::new());
                }
            }
        }
    }
}

fn sleep_until_deadline(deadline: Option<Instant>) -> tokio::time::Sleep {
    sleep_until(deadline.unwrap_or_else(Instant::now))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::produce::{Emitter, Outcome, ProduceFn};
    use crate::session::slot::prepare;

    fn boot(
        config: &SessionConfig,
    ) -> (
        mpsc::Sender<Queued>,
        mpsc::UnboundedSender<Ctrl>,
        watch::Receiver<Phase>,
        Bus,
    ) {
        let (work_tx, work_rx) = mpsc::channel(8);
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(Phase::Open);
        let bus = Bus::new(16);
        Dispatcher::spawn(work_rx, ctrl_rx, phase_tx, bus.clone(), config);
        (work_tx, ctrl_tx, phase_rx, bus)
    }

    #[tokio::test]
    async fn test_producer_queued_behind_the_marker_is_rejected() {
        let cfg = SessionConfig::default();
        let (work, _ctrl, phase, _bus) = boot(&cfg);

        // Both entries land before the dispatcher gets to run; the straggler
        // sits behind the shutdown marker.
        let (done_tx, done_rx) = oneshot::channel();
        work.send(Queued::Shutdown(done_tx)).await.unwrap();

        let built = Arc::new(AtomicBool::new(false));
        let b = built.clone();
        let (slot, task, seq) = prepare(
            Arc::from("straggler"),
            move || {
                b.store(true, Ordering::SeqCst);
                ProduceFn::new(|_out: Emitter<u32>, _ctx| async { Ok(()) })
            },
            4,
        );
        tokio::spawn(task);
        work.send(Queued::Producer(slot)).await.unwrap();

        done_rx.await.unwrap().unwrap();
        assert!(matches!(seq.wait().await, Outcome::Rejected));
        assert!(!built.load(Ordering::SeqCst));
        assert_eq!(*phase.borrow(), Phase::Sealed);
    }

    #[tokio::test]
    async fn test_seal_waiter_queued_behind_cancel_learns_the_outcome() {
        let cfg = SessionConfig::default();
        let (_work, ctrl, phase, _bus) = boot(&cfg);

        let (reply_tx, reply_rx) = oneshot::channel();
        ctrl.send(Ctrl::Cancel { reply: reply_tx }).unwrap();
        let (waiter_tx, waiter_rx) = oneshot::channel();
        ctrl.send(Ctrl::SealWaiter(waiter_tx)).unwrap();

        assert!(reply_rx.await.unwrap().is_empty());
        assert!(matches!(
            waiter_rx.await.unwrap(),
            Err(SessionError::Canceled)
        ));
        assert_eq!(*phase.borrow(), Phase::Canceled);
    }
}
