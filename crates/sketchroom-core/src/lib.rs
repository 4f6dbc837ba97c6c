//! SketchRoom Core Library
//!
//! Transport-agnostic relay logic for the SketchRoom collaborative canvas:
//! client identities, rooms, and fan-out of drawing deltas.

pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod rooms;
pub mod router;

pub use error::{DecodeError, DeliveryError};
pub use lifecycle::{Relay, RelayConfig};
pub use protocol::{ClientId, DrawingState, Envelope, Frame, RoomId, ServerMessage};
pub use registry::{ConnectionRegistry, Outbox};
pub use rooms::{JoinResult, Room, RoomDirectory};
pub use router::{MessageRouter, RouteOutcome, Session};
