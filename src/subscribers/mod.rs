//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the fan-out machinery for
//! handling events broadcast through the [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   dispatcher / worker ── publish(Event) ──► Bus ──► forwarding listener
//!                                                          │
//!                                                          ▼
//!                                                    SubscriberSet
//!                                               ┌────────┬─┴───────┬───────┐
//!                                               ▼        ▼         ▼       ▼
//!                                           LogWriter  Metrics   Custom   ...
//! ```
//!
//! Subscribers are wired in through
//! [`Session::builder`](crate::Session::builder); each one gets its own
//! bounded queue and worker task, so a slow or panicking subscriber never
//! stalls the session.
//!
//! ## Implementing custom subscribers
//! ```rust
//! use async_trait::async_trait;
//! use sequin::{Event, EventKind, Subscribe};
//!
//! struct MetricsSubscriber;
//!
//! #[async_trait]
//! impl Subscribe for MetricsSubscriber {
//!     async fn on_event(&self, event: &Event) {
//!         match event.kind {
//!             EventKind::ProducerFailed => {
//!                 // increment failure counter
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
