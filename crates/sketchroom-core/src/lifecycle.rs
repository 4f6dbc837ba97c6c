//! Connection accept/close handling around the shared relay state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::Frame;
use crate::registry::{ConnectionRegistry, Outbox};
use crate::rooms::RoomDirectory;
use crate::router::{MessageRouter, Session};

/// Tuning for the relay core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Deltas kept per room for late joiners (0 disables replay).
    pub history_limit: usize,
    /// Frames buffered per connection before new ones are dropped.
    pub outbox_capacity: usize,
}

impl RelayConfig {
    /// Smallest outbox that fits the `id` frame, a join ack and a full replay.
    pub fn min_outbox_capacity(&self) -> usize {
        self.history_limit.saturating_add(2)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            outbox_capacity: 256,
        }
    }
}

/// The relay service: registry, room directory and router, created once at
/// startup and shared by every connection task.
pub struct Relay {
    config: RelayConfig,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomDirectory>,
    router: MessageRouter,
}

impl Relay {
    /// Build a relay. An outbox too small for a full history replay is
    /// raised to [`RelayConfig::min_outbox_capacity`].
    pub fn new(mut config: RelayConfig) -> Self {
        let required = config.min_outbox_capacity();
        if config.outbox_capacity < required {
            warn!(
                "Outbox capacity {} cannot hold a {}-delta replay, using {}",
                config.outbox_capacity, config.history_limit, required
            );
            config.outbox_capacity = required;
        }

        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomDirectory::new(config.history_limit));
        let router = MessageRouter::new(Arc::clone(&registry), Arc::clone(&rooms));
        Self {
            config,
            registry,
            rooms,
            router,
        }
    }

    /// Register a new connection. The returned receiver already holds the
    /// `id` frame and must be drained into the transport.
    pub fn accept(&self) -> (Session, mpsc::Receiver<Frame>) {
        let (outbox, rx) = Outbox::channel(self.config.outbox_capacity);
        let client_id = self.registry.register(outbox);
        info!("New connection: {}", client_id);
        (Session::new(client_id), rx)
    }

    /// Route one inbound text frame. Bad input is logged and dropped.
    pub fn handle_text(&self, session: &mut Session, text: &str) {
        match self.router.route(session, text) {
            Ok(outcome) => debug!("Routed message from {}: {:?}", session.client_id(), outcome),
            Err(e) => warn!("Invalid message from {}: {}", session.client_id(), e),
        }
    }

    /// Tear down a closed connection: leave its rooms, then drop its identity.
    pub fn close(&self, mut session: Session) {
        self.router.leave_all(&mut session);
        self.registry.unregister(session.client_id());
        info!("Connection closed: {}", session.client_id());
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}
