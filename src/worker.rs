//! # Dedicated-thread execution of blocking jobs.
//!
//! A [`Worker`] owns one named OS thread draining a FIFO inbox with
//! `blocking_recv`. Callers hand over plain closures and get a [`Ticket`]
//! back; the closure runs off the async runtime, and any number of ticket
//! clones observe its single cached result.
//!
//! ## Architecture
//! ```text
//!   submit(job) ──► inbox (mpsc) ──► worker thread ──► oneshot ──► Ticket
//!   stop(final) ──► [final task, terminate marker]          │
//!                                                           └─► finished signal
//! ```
//!
//! ## Rules
//! - **One thread, FIFO**: jobs run one at a time in submission order.
//! - **Failure taxonomy**: a panicking job is caught on the worker thread and
//!   surfaces as [`WorkError::Bug`]; an `Err` return surfaces as
//!   [`WorkError::Middleware`] with the cause preserved.
//! - **Serialized stop**: submission and the stop transition share one lock,
//!   so a job admitted before [`Worker::stop`] always runs ahead of the
//!   terminate marker. After stop, submissions complete with
//!   [`WorkError::Rejected`] without running; anything that still sits behind
//!   the marker is rejected the same way when the thread drains its inbox.
//! - **Idempotent stop**: the first call enqueues the final task and the
//!   marker; later calls return an already-completed `Ok` ticket.
//! - **Graceful drop**: dropping the `Worker` closes the inbox; the thread
//!   finishes queued jobs and exits without running a final task.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::{WorkError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::ticket::Ticket;

type JobFn = Box<dyn FnOnce(Disposition) + Send + 'static>;

enum Job {
    Run(JobFn),
    Terminate,
}

/// How a drained job is treated: executed normally, or completed `Rejected`
/// because it sat behind the terminate marker.
#[derive(Clone, Copy)]
enum Disposition {
    Execute,
    Reject,
}

struct Gate {
    stopped: bool,
    finished: Option<oneshot::Receiver<()>>,
}

/// Handle to one background worker thread.
///
/// Not `Clone`; share it behind an `Arc` when several owners need to submit.
pub struct Worker {
    name: Arc<str>,
    bus: Option<Bus>,
    inbox: mpsc::UnboundedSender<Job>,
    gate: Mutex<Gate>,
}

impl Worker {
    /// Spawns the worker thread (named `sequin-worker-<name>`).
    pub fn start(name: impl Into<Arc<str>>) -> std::io::Result<Self> {
        Self::start_inner(name.into(), None)
    }

    /// Like [`Worker::start`], additionally publishing [`EventKind::JobFailed`]
    /// and [`EventKind::WorkerStopped`] events to `bus`.
    pub fn start_with_bus(name: impl Into<Arc<str>>, bus: Bus) -> std::io::Result<Self> {
        Self::start_inner(name.into(), Some(bus))
    }

    fn start_inner(name: Arc<str>, bus: Option<Bus>) -> std::io::Result<Self> {
        let (inbox, mut jobs) = mpsc::unbounded_channel::<Job>();
        let (finished_tx, finished_rx) = oneshot::channel::<()>();

        let thread_name = name.clone();
        let thread_bus = bus.clone();
        std::thread::Builder::new()
            .name(format!("sequin-worker-{name}"))
            .spawn(move || {
                while let Some(job) = jobs.blocking_recv() {
                    match job {
                        Job::Run(run) => run(Disposition::Execute),
                        Job::Terminate => break,
                    }
                }
                // Whatever is still queued sat behind the terminate marker.
                jobs.close();
                let mut rejected = 0_u32;
                while let Ok(job) = jobs.try_recv() {
                    if let Job::Run(run) = job {
                        run(Disposition::Reject);
                        rejected += 1;
                    }
                }
                if let Some(bus) = &thread_bus {
                    bus.publish(
                        Event::new(EventKind::WorkerStopped)
                            .with_producer(thread_name.clone())
                            .with_pending(rejected),
                    );
                }
                tracing::debug!(worker = %thread_name, rejected, "worker thread terminated");
                let _ = finished_tx.send(());
            })?;

        Ok(Self {
            name,
            bus,
            inbox,
            gate: Mutex::new(Gate {
                stopped: false,
                finished: Some(finished_rx),
            }),
        })
    }

    /// Worker name (also part of the thread name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`Worker::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        lock(&self.gate).stopped
    }

    /// Queues `job` and returns the ticket for its result.
    ///
    /// The ticket is cached and cloneable: the job runs once, every observer
    /// sees the same result. After [`Worker::stop`] the job is not queued and
    /// the ticket is already completed with [`WorkError::Rejected`].
    pub fn submit<T, E, F>(&self, job: F) -> Ticket<T>
    where
        T: Clone + Send + Sync + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T, WorkError>>();
        let name = self.name.clone();
        let bus = self.bus.clone();
        let run: JobFn = Box::new(move |disposition| {
            let result = match disposition {
                Disposition::Execute => match std::panic::catch_unwind(AssertUnwindSafe(job)) {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(WorkError::Middleware {
                        source: Arc::from(err.into()),
                    }),
                    Err(payload) => Err(WorkError::Bug {
                        message: panic_message(payload.as_ref()),
                    }),
                },
                // Never ran; only the terminal event accounts for it.
                Disposition::Reject => Err(WorkError::Rejected),
            };
            if let Err(err) = &result {
                if matches!(disposition, Disposition::Execute) {
                    tracing::debug!(worker = %name, error = %err, "background job failed");
                    if let Some(bus) = &bus {
                        bus.publish(
                            Event::new(EventKind::JobFailed)
                                .with_producer(name.clone())
                                .with_reason(err.as_message()),
                        );
                    }
                }
            }
            let _ = tx.send(result);
        });

        let gate = lock(&self.gate);
        if gate.stopped || self.inbox.send(Job::Run(run)).is_err() {
            return Ticket::ready(Err(WorkError::Rejected));
        }
        drop(gate);
        Ticket::from_oneshot(rx)
    }

    /// Stops the worker: queues `final_task`, then the terminate marker.
    ///
    /// Returns a ticket resolving `Ok(())` once the thread has terminated, or
    /// [`WorkError::Timeout`] if termination takes longer than `wait` (the
    /// window opens when the ticket is first awaited). A panicking final task
    /// is caught and logged, never propagated. Repeated calls are no-ops
    /// returning an already-completed `Ok` ticket.
    pub fn stop<F>(&self, final_task: F, wait: Duration) -> Ticket<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let finished = {
            let mut gate = lock(&self.gate);
            if gate.stopped {
                return Ticket::ready(Ok(()));
            }
            gate.stopped = true;

            let name = self.name.clone();
            let run: JobFn = Box::new(move |disposition| {
                if matches!(disposition, Disposition::Execute) {
                    if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(final_task)) {
                        tracing::warn!(
                            worker = %name,
                            panic = %panic_message(payload.as_ref()),
                            "final task panicked"
                        );
                    }
                }
            });
            let _ = self.inbox.send(Job::Run(run));
            let _ = self.inbox.send(Job::Terminate);
            gate.finished.take()
        };

        match finished {
            Some(rx) => Ticket::lazy(async move {
                match tokio::time::timeout(wait, rx).await {
                    Ok(_) => Ok(()),
                    Err(_) => Err(WorkError::Timeout { limit: wait }),
                }
            }),
            None => Ticket::ready(Ok(())),
        }
    }
}

fn lock(gate: &Mutex<Gate>) -> MutexGuard<'_, Gate> {
    match gate.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_submit_runs_once_and_caches() {
        let worker = Worker::start("cache").unwrap();
        assert_eq!(worker.name(), "cache");
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ticket = worker.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(21_u32)
        });

        let twin = ticket.clone();
        assert_eq!(ticket.outcome().await.unwrap(), 21);
        assert_eq!(twin.outcome().await.unwrap(), 21);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_jobs_run_in_submission_order() {
        let worker = Worker::start("fifo").unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tickets = Vec::new();
        for i in 0..5_u32 {
            let order = order.clone();
            tickets.push(worker.submit(move || {
                lock_vec(&order).push(i);
                Ok::<_, std::io::Error>(i)
            }));
        }
        for t in &tickets {
            t.outcome().await.unwrap();
        }
        assert_eq!(*lock_vec(&order), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_panicking_job_is_a_bug_and_thread_survives() {
        let worker = Worker::start("panics").unwrap();
        let boom: Ticket<u32> = worker.submit(|| -> Result<u32, std::io::Error> {
            panic!("kaput");
        });
        match boom.outcome().await {
            Err(WorkError::Bug { message }) => assert!(message.contains("kaput")),
            other => panic!("expected bug, got {other:?}"),
        }

        let after = worker.submit(|| Ok::<_, std::io::Error>(1_u32));
        assert_eq!(after.outcome().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failing_job_is_middleware_with_source() {
        let worker = Worker::start("fails").unwrap();
        let ticket: Ticket<u32> = worker.submit(|| {
            Err::<u32, _>(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "upstream stalled",
            ))
        });
        match ticket.outcome().await {
            Err(WorkError::Middleware { source }) => {
                assert_eq!(source.to_string(), "upstream stalled")
            }
            other => panic!("expected middleware, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_runs_final_task_and_is_idempotent() {
        let worker = Worker::start("stopper").unwrap();
        let cleaned = Arc::new(AtomicBool::new(false));
        let c = cleaned.clone();

        let stop = worker.stop(move || c.store(true, Ordering::SeqCst), Duration::from_secs(2));
        assert!(stop.outcome().await.is_ok());
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(worker.is_stopped());

        // Second stop: completed no-op, second final task never runs.
        let again = worker.stop(|| panic!("must not run"), Duration::from_secs(2));
        assert!(again.outcome().await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_rejected_without_running() {
        let worker = Worker::start("closed").unwrap();
        worker
            .stop(|| (), Duration::from_secs(2))
            .outcome()
            .await
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let ticket = worker.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(0_u32)
        });
        assert!(matches!(ticket.outcome().await, Err(WorkError::Rejected)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_times_out_when_jobs_drag() {
        let worker = Worker::start("slow").unwrap();
        let _busy = worker.submit(|| {
            std::thread::sleep(Duration::from_millis(400));
            Ok::<_, std::io::Error>(())
        });

        let stop = worker.stop(|| (), Duration::from_millis(50));
        assert!(matches!(
            stop.outcome().await,
            Err(WorkError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_final_task_panic_is_contained() {
        let worker = Worker::start("contained").unwrap();
        let stop = worker.stop(|| panic!("cleanup exploded"), Duration::from_secs(2));
        assert!(stop.outcome().await.is_ok());
    }

    fn lock_vec(v: &Mutex<Vec<u32>>) -> MutexGuard<'_, Vec<u32>> {
        match v.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }
}
