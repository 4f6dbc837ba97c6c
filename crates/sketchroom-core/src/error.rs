//! Error types for the relay core.

use thiserror::Error;

/// Inbound frame could not be turned into an [`Envelope`](crate::protocol::Envelope).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message type must be a string")]
    InvalidTag,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

/// A frame could not be handed to a peer's outbox.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue is full")]
    Full,
    #[error("connection is closed")]
    Closed,
    #[error("client is not registered")]
    Unregistered,
}
