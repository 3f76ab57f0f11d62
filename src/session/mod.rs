//! # Sequential execution sessions.
//!
//! A session runs attached producers **one at a time, in attachment order**,
//! no matter how long each takes or how fast it could finish. One dispatcher
//! task owns the queue and the lifecycle; handles only send messages.
//!
//! ## Architecture
//! ```text
//!  Session (clone-able handle)
//!    │ attach ──► Queued::Producer ─┐  work queue (bounded mpsc)
//!    │ seal   ──► Queued::Shutdown ─┤
//!    │                              ▼
//!    │ seal/cancel ──► ctrl ──► Dispatcher ── connect ──► producer task
//!    │                (unbounded)   │  ▲                     │    │
//!    │                              │  └──── done ◄──────────┘    ▼
//!    └── phase ◄── watch ───────────┘                         Sequence
//!                                                          (items + outcome)
//! ```
//!
//! ## Rules
//! - **Order**: producers connect strictly in attachment order; the next one
//!   waits for the previous one's termination, success or not.
//! - **Deferred factories**: a producer is *built* only when connected. Until
//!   then `cancel` can reclaim it, factory never invoked.
//! - **Seal**: closes the queue behind a shutdown marker; what was attached
//!   before still drains, later attaches are `Rejected`.
//! - **Cancel**: terminal; hands back the never-connected producers and
//!   cancels the running one's token (best effort).
//! - **Timeouts**: an optional connect timeout bounds every wait between and
//!   during producers; exceeding it cancels the session.

mod builder;
mod dispatcher;
mod session;
mod slot;

pub use builder::SessionBuilder;
pub use dispatcher::Phase;
pub use session::{Drain, Session};
pub use slot::PendingProducer;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::{FailurePolicy, SessionConfig};
    use crate::error::{SessionError, WorkError};
    use crate::events::{Event, EventKind};
    use crate::produce::{Emitter, Outcome};
    use crate::subscribers::Subscribe;

    fn config() -> SessionConfig {
        SessionConfig::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_producers_run_in_attachment_order_not_speed_order() {
        let session = Session::new(config());
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        session
            .attach_fn("slow", move |_out: Emitter<u32>, _ctx| {
                let o = o.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    o.lock().unwrap().push("slow");
                    Ok(())
                }
            })
            .await
            .unwrap();

        let o = order.clone();
        session
            .attach_fn("fast", move |_out: Emitter<u32>, _ctx| {
                let o = o.clone();
                async move {
                    o.lock().unwrap().push("fast");
                    Ok(())
                }
            })
            .await
            .unwrap();

        session.seal().await.unwrap().wait().await.unwrap();
        assert_eq!(*order.lock().unwrap(), ["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_first_attachment_connects_without_seal() {
        let session = Session::new(config());
        let mut seq = session
            .attach_fn("first", |out: Emitter<u32>, _ctx| async move {
                let _ = out.emit(7).await;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seq.next().await, Some(7));
        session.seal().await.unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_seal_blocks_attach_and_factory_never_runs() {
        let session = Session::new(config());
        session
            .attach_fn("early", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await
            .unwrap();

        let drain = session.seal().await.unwrap();

        let built = Arc::new(AtomicBool::new(false));
        let b = built.clone();
        let refused = session
            .attach("late", move || {
                b.store(true, Ordering::SeqCst);
                crate::produce::ProduceFn::new(|_out: Emitter<u32>, _ctx| async { Ok(()) })
            })
            .await;

        assert!(matches!(refused, Err(SessionError::Rejected)));
        assert!(!built.load(Ordering::SeqCst));
        drain.wait().await.unwrap();
        assert_eq!(session.phase(), Phase::Sealed);
    }

    #[tokio::test]
    async fn test_cancel_returns_unconnected_producers_in_order() {
        let session = Session::new(config());

        let hold = Arc::new(Notify::new());
        let h = hold.clone();
        let mut running = session
            .attach_fn("p1", move |out: Emitter<u32>, ctx| {
                let h = h.clone();
                async move {
                    let _ = out.emit(1).await;
                    tokio::select! {
                        _ = h.notified() => {}
                        _ = ctx.cancelled() => {}
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        let built = Arc::new(AtomicUsize::new(0));
        for name in ["p2", "p3"] {
            let b = built.clone();
            session
                .attach(name, move || {
                    b.fetch_add(1, Ordering::SeqCst);
                    crate::produce::ProduceFn::new(|_out: Emitter<u32>, _ctx| async { Ok(()) })
                })
                .await
                .unwrap();
        }

        // p1 is definitely connected once its first item arrives.
        assert_eq!(running.next().await, Some(1));

        let returned = session.cancel().await;
        let names: Vec<&str> = returned.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["p2", "p3"]);
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(session.phase(), Phase::Canceled);

        // The running producer got the forwarded cancellation.
        assert!(matches!(running.wait().await, Outcome::Canceled));

        // Idempotent: nothing left to hand back.
        assert!(session.cancel().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_saturates_when_queue_stays_full() {
        let mut cfg = config();
        cfg.queue_capacity = 1;
        cfg.enqueue_timeout = Some(Duration::from_millis(50));
        let session = Session::new(cfg);

        let hold = Arc::new(Notify::new());
        let h = hold.clone();
        let mut first = session
            .attach_fn("holder", move |out: Emitter<u32>, _ctx| {
                let h = h.clone();
                async move {
                    let _ = out.emit(0).await;
                    h.notified().await;
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(first.next().await, Some(0));

        let queued_ran = Arc::new(AtomicBool::new(false));
        let q = queued_ran.clone();
        session
            .attach_fn("queued", move |_out: Emitter<u32>, _ctx| {
                let q = q.clone();
                async move {
                    q.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        // Queue is at capacity and the dispatcher is busy with "holder".
        let overflow = session
            .attach_fn("overflow", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await
            .err();
        match overflow {
            Some(SessionError::Saturated { waited }) => {
                assert_eq!(waited, Duration::from_millis(50));
            }
            other => panic!("expected saturation, got {other:?}"),
        }

        hold.notify_one();
        session.seal().await.unwrap().wait().await.unwrap();
        assert!(queued_ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_cancels_the_session() {
        let mut cfg = config();
        cfg.connect_timeout = Some(Duration::from_millis(100));
        let session = Session::new(cfg);
        let mut events = session.bus().subscribe();

        session
            .attach_fn("only", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await
            .unwrap();

        // After "only" finishes nothing else arrives; the idle wait must trip.
        let mut saw_timeout = false;
        loop {
            let ev = events.recv().await.unwrap();
            match ev.kind {
                EventKind::ConnectTimeout => {
                    assert_eq!(ev.waited_ms, Some(100));
                    saw_timeout = true;
                }
                EventKind::SessionCanceled => break,
                _ => {}
            }
        }
        assert!(saw_timeout);
        assert_eq!(session.phase(), Phase::Canceled);

        let refused = session
            .attach_fn("late", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await;
        assert!(matches!(refused, Err(SessionError::Rejected)));
        assert!(matches!(session.seal().await, Err(SessionError::Rejected)));
    }

    #[tokio::test]
    async fn test_continue_policy_keeps_draining_after_failure() {
        let session = Session::new(config());

        let failed = session
            .attach_fn("bad", |_out: Emitter<u32>, _ctx| async {
                Err(WorkError::middleware(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "boom",
                )))
            })
            .await
            .unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let next = session
            .attach_fn("good", move |_out: Emitter<u32>, _ctx| {
                let r = r.clone();
                async move {
                    r.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        session.seal().await.unwrap().wait().await.unwrap();
        assert!(matches!(failed.wait().await, Outcome::Failed(_)));
        assert!(matches!(next.wait().await, Outcome::Completed));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_halt_policy_cancels_after_failure() {
        let mut cfg = config();
        cfg.on_failure = FailurePolicy::Halt;
        let session = Session::new(cfg);

        let failed = session
            .attach_fn("bad", |_out: Emitter<u32>, _ctx| async {
                Err(WorkError::middleware(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "boom",
                )))
            })
            .await
            .unwrap();

        let built = Arc::new(AtomicBool::new(false));
        let b = built.clone();
        let starved = session
            .attach("never", move || {
                b.store(true, Ordering::SeqCst);
                crate::produce::ProduceFn::new(|_out: Emitter<u32>, _ctx| async { Ok(()) })
            })
            .await
            .unwrap();

        assert!(matches!(failed.wait().await, Outcome::Failed(_)));
        assert!(matches!(starved.wait().await, Outcome::Canceled));
        assert!(!built.load(Ordering::SeqCst));
        assert_eq!(session.phase(), Phase::Canceled);
    }

    #[tokio::test]
    async fn test_repeat_seal_hands_out_more_drains() {
        let session = Session::new(config());
        session
            .attach_fn("once", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await
            .unwrap();

        let first = session.seal().await.unwrap();
        let second = session.seal().await.unwrap();
        first.wait().await.unwrap();
        second.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_seal_leaves_the_session_open() {
        let mut cfg = config();
        cfg.queue_capacity = 1;
        cfg.enqueue_timeout = Some(Duration::from_millis(50));
        let session = Session::new(cfg);

        let hold = Arc::new(Notify::new());
        let h = hold.clone();
        let mut first = session
            .attach_fn("holder", move |out: Emitter<u32>, _ctx| {
                let h = h.clone();
                async move {
                    let _ = out.emit(0).await;
                    h.notified().await;
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(first.next().await, Some(0));

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        session
            .attach_fn("queued", move |_out: Emitter<u32>, _ctx| {
                let r = r.clone();
                async move {
                    r.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();

        // No room for the shutdown marker: sealing must change nothing.
        assert!(matches!(
            session.seal().await,
            Err(SessionError::Saturated { .. })
        ));
        assert_eq!(session.phase(), Phase::Open);

        hold.notify_one();
        session.seal().await.unwrap().wait().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropped_sequence_does_not_stop_the_producer() {
        let session = Session::new(config());
        let finished = Arc::new(AtomicBool::new(false));

        let f = finished.clone();
        let seq = session
            .attach_fn("fire-and-forget", move |out: Emitter<u32>, _ctx| {
                let f = f.clone();
                async move {
                    for n in 0..3 {
                        // Nobody may be listening; keep going regardless.
                        let _ = out.emit(n).await;
                    }
                    f.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
        drop(seq);

        session.seal().await.unwrap().wait().await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dropping_every_handle_seals_implicitly() {
        let session = Session::new(config());
        let mut events = session.bus().subscribe();

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        session
            .attach_fn("leftover", move |_out: Emitter<u32>, _ctx| {
                let r = r.clone();
                async move {
                    r.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await
            .unwrap();
        drop(session);

        loop {
            match events.recv().await {
                Ok(ev) if matches!(ev.kind, EventKind::Drained) => break,
                Ok(_) => {}
                Err(err) => panic!("drain event never arrived: {err}"),
            }
        }
        assert!(ran.load(Ordering::SeqCst));
    }

    struct CountingSubscriber {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Subscribe for CountingSubscriber {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_builder_delivers_events_to_subscribers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let session = Session::builder(config())
            .with_subscriber(CountingSubscriber { seen: seen.clone() })
            .build();

        let seq = session
            .attach_fn("observed", |_out: Emitter<u32>, _ctx| async { Ok(()) })
            .await
            .unwrap();
        assert!(matches!(seq.wait().await, Outcome::Completed));
        session.seal().await.unwrap().wait().await.unwrap();

        // Attached, Connected, ProducerCompleted, Sealed, Drained.
        for _ in 0..200 {
            if seen.load(Ordering::SeqCst) >= 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_manual_connect_of_returned_producer() {
        let session = Session::new(config());

        let hold = Arc::new(Notify::new());
        let h = hold.clone();
        let mut running = session
            .attach_fn("p1", move |out: Emitter<u32>, ctx| {
                let h = h.clone();
                async move {
                    let _ = out.emit(1).await;
                    tokio::select! {
                        _ = h.notified() => {}
                        _ = ctx.cancelled() => {}
                    }
                    Ok(())
                }
            })
            .await
            .unwrap();

        let mut reclaimed = session
            .attach_fn("p2", |out: Emitter<u32>, _ctx| async move {
                let _ = out.emit(2).await;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(running.next().await, Some(1));
        let mut returned = session.cancel().await;
        assert_eq!(returned.len(), 1);

        // Run the reclaimed producer by hand, outside any session.
        let pending = returned.remove(0);
        assert!(!pending.token().is_cancelled());
        pending.connect();
        assert_eq!(reclaimed.next().await, Some(2));
        assert!(matches!(reclaimed.wait().await, Outcome::Completed));
    }
}
