//! # Function-backed producer (`ProduceFn`)
//!
//! [`ProduceFn`] wraps a closure `F: Fn(Emitter<T>, CancellationToken) -> Fut`,
//! producing a fresh future per run. This avoids shared mutable state: each
//! attachment gets a future owning its own state, and shared state has to be
//! passed in explicitly (e.g. behind an `Arc`).
//!
//! Unlike hand-written [`Produce`] types, a `ProduceFn` carries no name of its
//! own — the name is supplied at [`Session::attach`](crate::Session::attach)
//! time, where one closure may be attached under many names.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use sequin::{Emitter, ProduceFn, WorkError};
//!
//! let producer: ProduceFn<_, u32> =
//!     ProduceFn::new(|out: Emitter<u32>, _ctx: CancellationToken| async move {
//!         out.emit(1).await.ok();
//!         out.emit(2).await.ok();
//!         Ok::<_, WorkError>(())
//!     });
//! # let _ = producer;
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::produce::{Emitter, Produce, ProduceRef};
use crate::error::WorkError;

/// Function-backed producer implementation.
///
/// Wraps a closure that *creates* a new future per run. The emitted item type
/// `T` is a struct parameter: it appears only in the closure's argument list,
/// which cannot anchor a type parameter on its own.
#[derive(Debug)]
pub struct ProduceFn<F, T> {
    f: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> ProduceFn<F, T> {
    /// Creates a new function-backed producer.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _item: PhantomData,
        }
    }
}

impl<F, Fut, T> ProduceFn<F, T>
where
    F: Fn(Emitter<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    T: Send + 'static,
{
    /// Creates the producer and returns it as a shared handle (`Arc<dyn Produce>`).
    pub fn arc(f: F) -> ProduceRef<T> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut, T> Produce for ProduceFn<F, T>
where
    F: Fn(Emitter<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    T: Send + 'static,
{
    type Item = T;

    async fn produce(&self, out: Emitter<T>, ctx: CancellationToken) -> Result<(), WorkError> {
        (self.f)(out, ctx).await
    }
}
