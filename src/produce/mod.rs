//! Producer abstractions: the trait, the function adapter, and the
//! observer-side sequence.
//!
//! ## Contents
//! - [`Produce`] — async, cancelable item source (one run per attachment)
//! - [`ProduceFn`] — closure-backed implementation
//! - [`ProduceRef`] — `Arc<dyn Produce>` alias
//! - [`Emitter`], [`Disconnected`] — push side handed to the producer
//! - [`Sequence`], [`Outcome`] — pull side returned by `Session::attach`

mod produce;
mod produce_fn;
mod sequence;

pub use produce::{Disconnected, Emitter, Produce, ProduceRef};
pub use produce_fn::ProduceFn;
pub use sequence::{Outcome, Sequence};

pub(crate) use sequence::Emission;
