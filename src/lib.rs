//! # sequin
//!
//! **Sequin** is a sequential-execution scheduling library for Rust.
//!
//! It coordinates asynchronous work that must happen *one piece at a time, in
//! a fixed order*, without duplicating effort: producers attached to a
//! [`Session`] run strictly in attachment order, a background [`Worker`]
//! offloads blocking jobs to a dedicated thread and shares each result among
//! any number of observers, [`Memo`] computes a value at most once per key,
//! and [`Retry`] re-attempts a failed computation under a shared budget and a
//! caller deadline.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!               attach / seal / cancel
//!    Session ─────────────────────────► work + ctrl channels
//!       │                                       │
//!       │ Sequence (items + outcome)            ▼
//!       ◄──────────────┐              ┌───────────────────┐
//!                      │              │    dispatcher     │ one producer at
//!                      │              │ (owns the queue   │ a time, strictly
//!                      │              │  and the phase)   │ attachment order
//!                      │              └────────┬──────────┘
//!                      │               connect │ ▲ done
//!                      │              ┌────────▼──────────┐
//!                      └───emits──────│   producer task   │
//!                                     └────────┬──────────┘
//!                                              │ publishes
//!                                              ▼
//!                           Bus (broadcast) ──► SubscriberSet ──► on_event()
//! ```
//!
//! Alongside the session:
//! ```text
//!    Worker     submit(FnOnce) ──► dedicated OS thread ──► Ticket<V>
//!    Memo<K,V>  get(key)       ──► at most one factory call per key
//!    Retry<V>   get(deadline)  ──► first try + shared budgeted re-attempts
//! ```
//!
//! ### A producer's life
//! ```text
//! attach(name, factory) ──► armed in queue ──► connect ──► factory() ──► produce(out, token)
//!         │                      │ cancel()                                      │
//!         ▼                      ▼                                               ▼
//!   Sequence<Item>        PendingProducer                           Completed / Failed /
//! (items once connected)  (handed back, factory never ran)          Canceled / Rejected
//! ```
//!
//! ## Features
//! | Area               | Description                                                             | Key types / traits                     |
//! |--------------------|-------------------------------------------------------------------------|----------------------------------------|
//! | **Sessions**       | Run producers one at a time, in attachment order; seal, drain, cancel.  | [`Session`], [`Sequence`], [`Drain`]   |
//! | **Producers**      | Define item sources as trait impls or plain closures.                   | [`Produce`], [`ProduceFn`], [`Emitter`]|
//! | **Background work**| Offload blocking jobs to a dedicated thread, share the cached result.   | [`Worker`], [`Ticket`]                 |
//! | **Memoization**    | Compute a value at most once per key, self-healing on cancellation.     | [`Memo`]                               |
//! | **Retry**          | Bounded, deadline-aware re-attempts shared across concurrent callers.   | [`Retry`]                              |
//! | **Subscriber API** | Hook into session events (logging, metrics, custom subscribers).        | [`Subscribe`], [`Bus`]                 |
//! | **Errors**         | Typed errors for scheduling and for the work itself.                    | [`SessionError`], [`WorkError`]        |
//! | **Configuration**  | Centralize queue, timeout and policy settings.                          | [`SessionConfig`], [`FailurePolicy`]   |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use sequin::{Session, SessionConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(SessionConfig::default());
//!
//!     // Producers run in attachment order: "numbers" finishes before
//!     // "letters" is even built.
//!     let mut numbers = session
//!         .attach_fn("numbers", |out, _ctx| async move {
//!             for n in 1..=3 {
//!                 if out.emit(n).await.is_err() {
//!                     break;
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .await?;
//!
//!     let mut letters = session
//!         .attach_fn("letters", |out, _ctx| async move {
//!             let _ = out.emit('a').await;
//!             Ok(())
//!         })
//!         .await?;
//!
//!     while let Some(n) = numbers.next().await {
//!         println!("got {n}");
//!     }
//!     assert_eq!(letters.next().await, Some('a'));
//!
//!     session.seal().await?.wait().await?;
//!     Ok(())
//! }
//! ```
mod config;
mod error;
mod events;
mod memo;
mod produce;
mod retry;
mod session;
mod subscribers;
mod ticket;
mod worker;

// ---- Public re-exports ----

pub use config::{FailurePolicy, SessionConfig};
pub use error::{SessionError, WorkError};
pub use events::{Bus, Event, EventKind};
pub use memo::Memo;
pub use produce::{Disconnected, Emitter, Outcome, Produce, ProduceFn, ProduceRef, Sequence};
pub use retry::Retry;
pub use session::{Drain, PendingProducer, Phase, Session, SessionBuilder};
pub use subscribers::{Subscribe, SubscriberSet};
pub use ticket::Ticket;
pub use worker::Worker;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
