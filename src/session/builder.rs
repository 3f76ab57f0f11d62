//! # Builder wiring a session to its subscribers.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use super::session::Session;
use crate::config::SessionConfig;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Session`] with optional event subscribers.
///
/// Subscribers receive session events (attachments, completions, failures,
/// drain) through dedicated workers with bounded queues; see
/// [`Subscribe`] for the isolation rules.
pub struct SessionBuilder {
    config: SessionConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SessionBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            subscribers: Vec::new(),
        }
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: impl Subscribe) -> Self {
        self.subscribers.push(Arc::new(subscriber));
        self
    }

    /// Replaces the subscriber list.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the session and starts the subscriber fan-out.
    ///
    /// A forwarding listener moves events from the bus into the
    /// [`SubscriberSet`]. A lagging listener skips the overwritten events and
    /// keeps going; it exits once the session (and every clone of it) is gone
    /// and the drain has finished, then shuts the subscriber workers down.
    pub fn build(self) -> Session {
        let bus = Bus::new(self.config.bus_capacity);
        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers);
            let mut rx = bus.subscribe();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(ev) => set.emit_arc(Arc::new(ev)),
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "subscribers lagged behind the event bus");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                set.shutdown().await;
            });
        }
        Session::with_bus(self.config, bus)
    }
}
