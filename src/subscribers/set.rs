//! # SubscriberSet: non-blocking fan-out over multiple subscribers.
//!
//! [`SubscriberSet`] distributes each [`Event`](crate::events::Event) to
//! multiple subscribers **without awaiting** their processing.
//!
//! ## What it guarantees
//! - `emit(&Event)` returns immediately.
//! - Per-subscriber FIFO (queue order).
//! - Panics inside subscribers are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - No global ordering across different subscribers.
//! - No retries on per-subscriber queue overflow (events are dropped for that
//!   subscriber).
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │                        (Arc-clone per subscriber)
//!        ├────────────────► [queue S1] ─► worker S1 ─► on_event()
//!        ├────────────────► [queue S2] ─► worker S2 ─► on_event()
//!        └────────────────► [queue SN] ─► worker SN ─► on_event()
//! ```

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::events::Event;

use super::Subscribe;

/// Per-subscriber channel with metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Composite fan-out with per-subscriber bounded queues and worker tasks.
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker per subscriber.
    ///
    /// Each subscriber gets a bounded queue (capacity from
    /// [`Subscribe::queue_capacity`], clamped to at least 1) and a dedicated
    /// worker that runs until the queue closes.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());
                    if let Err(payload) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        tracing::warn!(
                            subscriber = s.name(),
                            panic = %panic_message(payload.as_ref()),
                            "subscriber panicked; event dropped"
                        );
                    }
                }
            });

            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }

        Self { channels, workers }
    }

    /// Fans one event out to all subscribers (non-blocking; clones the event).
    ///
    /// If a subscriber's queue is **full** or **closed**, the event is dropped
    /// for it and a warning is logged with the subscriber's name.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// [`emit`](Self::emit) for a pre-allocated event (no extra clone).
    pub fn emit_arc(&self, event: Arc<Event>) {
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber = channel.name,
                        "subscriber queue full; event dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!(
                        subscriber = channel.name,
                        "subscriber worker gone; event dropped"
                    );
                }
            }
        }
    }

    /// Graceful shutdown: close all queues and await worker completion.
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::events::EventKind;

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _event: &Event) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Grumpy;

    #[async_trait]
    impl Subscribe for Grumpy {
        async fn on_event(&self, _event: &Event) {
            panic!("no events please");
        }

        fn name(&self) -> &'static str {
            "grumpy"
        }
    }

    #[tokio::test]
    async fn test_all_subscribers_see_every_event() {
        let a = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let b = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let set = SubscriberSet::new(vec![a.clone() as _, b.clone() as _]);
        assert_eq!(set.len(), 2);

        for _ in 0..5 {
            set.emit(&Event::new(EventKind::Drained));
        }
        set.shutdown().await;

        assert_eq!(a.seen.load(Ordering::SeqCst), 5);
        assert_eq!(b.seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_does_not_stop_others() {
        let quiet = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });
        let set = SubscriberSet::new(vec![Arc::new(Grumpy) as _, quiet.clone() as _]);

        set.emit(&Event::new(EventKind::Sealed));
        set.emit(&Event::new(EventKind::Drained));
        set.shutdown().await;

        assert_eq!(quiet.seen.load(Ordering::SeqCst), 2);
    }
}
