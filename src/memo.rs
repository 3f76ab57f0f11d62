//! # Keyed memoization of asynchronous computations.
//!
//! A [`Memo`] owns one factory and hands out [`Ticket`]s: the first request
//! for a key installs the computation, every later request for that key joins
//! it. Entries whose computation ended [`WorkError::Canceled`] are evicted and
//! recomputed transparently by [`Memo::value`].
//!
//! ## Rules
//! - **Insert-if-absent**: installation happens under a write lock with a
//!   double check, so two racing requesters never install twice — the loser
//!   joins the winner's ticket.
//! - **One factory call per resident key**: the factory builds the future
//!   exactly once per installed entry; execution is shared through the ticket
//!   and advances while at least one clone is being awaited.
//! - **Generation-checked eviction**: self-healing only removes the exact
//!   entry it observed (a concurrent replacement is left alone), so healing
//!   and `forget` can interleave safely.
//! - **`forget` is best-effort**: under concurrent access its boolean answer
//!   can be stale by the time the caller reads it; callers that need an exact
//!   answer must serialize access themselves.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::error::WorkError;
use crate::ticket::Ticket;

type Factory<K, V> = Box<dyn Fn(K) -> BoxFuture<'static, Result<V, WorkError>> + Send + Sync>;

struct Entry<V> {
    generation: u64,
    ticket: Ticket<V>,
}

struct Slots<K, V> {
    map: HashMap<K, Entry<V>>,
    next_generation: u64,
}

/// Compute-once cache keyed by `K`.
///
/// The factory is fixed at construction; keys select which computation to
/// (re)use. See the module docs for the locking and healing rules.
pub struct Memo<K, V> {
    slots: RwLock<Slots<K, V>>,
    factory: Factory<K, V>,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache around `factory`.
    ///
    /// The factory receives the key and returns the future to memoize; it is
    /// only invoked when a key is requested for the first time (or again after
    /// eviction).
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, WorkError>> + Send + 'static,
    {
        Self {
            slots: RwLock::new(Slots {
                map: HashMap::new(),
                next_generation: 0,
            }),
            factory: Box::new(move |key| factory(key).boxed()),
        }
    }

    /// Returns the ticket for `key`, installing the computation if absent.
    pub async fn get(&self, key: &K) -> Ticket<V> {
        self.obtain(key).await.1
    }

    /// Awaits the value for `key`, healing cancelled entries.
    ///
    /// If the memoized computation ends [`WorkError::Canceled`], the entry is
    /// evicted and the computation installed anew, transparently to the
    /// caller. The healing loop is deliberately unbounded: a factory that
    /// keeps yielding cancelled work keeps it alive, so callers wanting a
    /// bound should wrap this in [`tokio::time::timeout`] (as
    /// [`Retry::get`](crate::Retry::get) does) or await [`Memo::get`]'s
    /// ticket directly.
    pub async fn value(&self, key: &K) -> Result<V, WorkError> {
        loop {
            let (generation, ticket) = self.obtain(key).await;
            match ticket.outcome().await {
                Err(WorkError::Canceled) => self.evict_generation(key, generation).await,
                other => return other,
            }
        }
    }

    /// Evicts `key`; returns whether an entry was present.
    ///
    /// In-flight tickets for the evicted entry keep running and resolve as
    /// usual; only the cache association is dropped, so the next request
    /// recomputes.
    pub async fn forget(&self, key: &K) -> bool {
        self.slots.write().await.map.remove(key).is_some()
    }

    /// Number of resident entries.
    pub async fn len(&self) -> usize {
        self.slots.read().await.map.len()
    }

    /// Whether the cache currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.map.is_empty()
    }

    async fn obtain(&self, key: &K) -> (u64, Ticket<V>) {
        {
            let slots = self.slots.read().await;
            if let Some(entry) = slots.map.get(key) {
                return (entry.generation, entry.ticket.clone());
            }
        }
        let mut slots = self.slots.write().await;
        if let Some(entry) = slots.map.get(key) {
            // Lost the install race; first writer wins.
            return (entry.generation, entry.ticket.clone());
        }
        let generation = slots.next_generation;
        slots.next_generation += 1;
        let ticket = Ticket::lazy((self.factory)(key.clone()));
        slots.map.insert(
            key.clone(),
            Entry {
                generation,
                ticket: ticket.clone(),
            },
        );
        (generation, ticket)
    }

    async fn evict_generation(&self, key: &K, generation: u64) {
        let mut slots = self.slots.write().await;
        if slots
            .map
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            slots.map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn counting_memo(calls: Arc<AtomicU32>) -> Memo<String, u32> {
        Memo::new(move |key: String| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(key.len() as u32)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_computation() {
        let calls = Arc::new(AtomicU32::new(0));
        let memo = Arc::new(counting_memo(calls.clone()));

        let mut waiters = Vec::new();
        for _ in 0..10 {
            let memo = memo.clone();
            waiters.push(tokio::spawn(async move {
                memo.value(&"alpha".to_string()).await
            }));
        }
        for w in waiters {
            assert_eq!(w.await.unwrap().unwrap(), 5);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_compute_separately() {
        let calls = Arc::new(AtomicU32::new(0));
        let memo = counting_memo(calls.clone());

        assert_eq!(memo.value(&"ab".to_string()).await.unwrap(), 2);
        assert_eq!(memo.value(&"abcd".to_string()).await.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_forces_recompute() {
        let calls = Arc::new(AtomicU32::new(0));
        let memo = counting_memo(calls.clone());
        let key = "k".to_string();

        assert!(memo.is_empty().await);
        assert_eq!(memo.value(&key).await.unwrap(), 1);
        assert!(memo.forget(&key).await);
        assert!(memo.is_empty().await);
        assert!(!memo.forget(&key).await);
        assert_eq!(memo.value(&key).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_entry_heals() {
        let calls = Arc::new(AtomicU32::new(0));
        let memo: Memo<String, u32> = Memo::new({
            let calls = calls.clone();
            move |_key: String| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(WorkError::Canceled)
                    } else {
                        Ok(42)
                    }
                }
            }
        });

        let key = "self-healing".to_string();
        assert_eq!(memo.value(&key).await.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Non-cancelled failures are cached, not healed.
        let sticky: Memo<String, u32> =
            Memo::new(|_key: String| async { Err(WorkError::middleware("down")) });
        let first = sticky.value(&key).await;
        assert!(matches!(first, Err(WorkError::Middleware { .. })));
        let second = sticky.get(&key).await.outcome().await;
        assert!(matches!(second, Err(WorkError::Middleware { .. })));
        assert_eq!(sticky.len().await, 1);
    }
}
