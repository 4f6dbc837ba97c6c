//! Live connections and the identities assigned to them.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::error::DeliveryError;
use crate::protocol::{ClientId, Frame, ServerMessage};

/// Send half of a connection's bounded outbound queue.
///
/// The socket task owns the receiver and writes every frame to the
/// transport in order. Delivery never waits: a full queue drops the frame.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Frame>,
}

impl Outbox {
    pub fn new(tx: mpsc::Sender<Frame>) -> Self {
        Self { tx }
    }

    /// Create an outbox together with the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Maps every live client identity to its outbox.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ClientId, Outbox>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh identity to a connection.
    ///
    /// The `id` frame is queued before the binding is published, so nothing
    /// routed to this client can overtake it.
    pub fn register(&self, outbox: Outbox) -> ClientId {
        loop {
            let client_id = ClientId::generate();
            let Entry::Vacant(slot) = self.connections.entry(client_id.clone()) else {
                warn!("Client id collision on {}, drawing another", client_id);
                continue;
            };

            let announce = ServerMessage::Id {
                message: client_id.clone(),
            };
            match announce.to_frame() {
                Ok(frame) => {
                    if let Err(e) = outbox.deliver(frame) {
                        warn!("Could not announce id to {}: {}", client_id, e);
                    }
                }
                Err(e) => error!("Failed to encode id frame: {}", e),
            }

            slot.insert(outbox);
            debug!("Registered client {}", client_id);
            return client_id;
        }
    }

    /// Drop a binding. Returns whether it was present; calling twice is harmless.
    pub fn unregister(&self, client_id: &ClientId) -> bool {
        self.connections.remove(client_id).is_some()
    }

    pub fn lookup(&self, client_id: &ClientId) -> Option<Outbox> {
        self.connections.get(client_id).map(|entry| entry.value().clone())
    }

    /// Queue a frame for one client.
    pub fn send(&self, client_id: &ClientId, frame: Frame) -> Result<(), DeliveryError> {
        match self.connections.get(client_id) {
            Some(outbox) => outbox.deliver(frame),
            None => Err(DeliveryError::Unregistered),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
