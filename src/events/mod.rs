//! Session events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the session dispatcher, the session
//! handles and background workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the session dispatcher (connect/outcome/terminal events),
//!   `Session` handles (attach/saturation), `Worker` threads (job failures,
//!   shutdown).
//! - **Consumers**: the forwarding listener spawned by `SessionBuilder` (fans
//!   out to `SubscriberSet`), plus any receiver obtained from
//!   `Session::bus()`.
//!
//! See `session/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
