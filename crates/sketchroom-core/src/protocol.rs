//! Wire protocol spoken between drawing clients and the relay.
//!
//! Every frame is a JSON object. Control messages carry a `type`
//! discriminator:
//! ```json
//! { "type": "create room" }
//! { "type": "join-room", "roomId": "…", "lines": [], "texts": [] }
//! { "type": "leave-room", "roomId": "…" }
//! ```
//! Anything else is a drawing delta and is relayed byte-for-byte, e.g.
//! `{ "lines": [[0, 0, 10, 10]] }`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::DecodeError;

/// One encoded outbound frame, shared between every recipient of a fan-out.
pub type Frame = Arc<str>;

/// Drawing state attached to a join request (lines, rectangles, circles,
/// arrows, texts, or whatever else the client keeps). Never interpreted.
pub type DrawingState = Map<String, Value>;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_FOUND: u16 = 404;

const TYPE_FIELD: &str = "type";
const ROOM_ID_FIELD: &str = "roomId";
const STATUS_FIELD: &str = "status";

/// Discriminator values used on the wire.
pub mod kind {
    pub const ID: &str = "id";
    pub const CREATE_ROOM: &str = "create room";
    pub const ROOM_CREATED: &str = "room-created";
    pub const JOIN_ROOM: &str = "join-room";
    pub const LEAVE_ROOM: &str = "leave-room";
    pub const SOMEONE_JOINED: &str = "someone-joined-room";
    pub const SOMEONE_LEFT: &str = "someone-left-room";

    /// Kinds only the relay may emit.
    pub fn is_server_only(tag: &str) -> bool {
        matches!(tag, ID | ROOM_CREATED | SOMEONE_JOINED | SOMEONE_LEFT)
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Draw a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Identity assigned to a connection for its whole lifetime.
    ClientId
);
opaque_id!(
    /// Identity of a collaboration room.
    RoomId
);

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Create a room owned by the sender
    CreateRoom,
    /// Join an existing room, carrying the joiner's local drawing state
    JoinRoom { room_id: RoomId, state: DrawingState },
    /// Leave a room
    LeaveRoom { room_id: RoomId },
    /// Untyped drawing delta, kept as the exact inbound text
    Delta(Frame),
    /// Typed message the relay has no handler for
    Unrecognized { tag: String, frame: Frame },
}

impl Envelope {
    /// Decode one inbound text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let Value::Object(mut fields) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };

        let tag = match fields.get(TYPE_FIELD) {
            None => return Ok(Self::Delta(Frame::from(text))),
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => return Err(DecodeError::InvalidTag),
        };

        match tag.as_str() {
            kind::CREATE_ROOM => Ok(Self::CreateRoom),
            kind::JOIN_ROOM => {
                let room_id = take_room_id(&mut fields)?;
                fields.remove(TYPE_FIELD);
                fields.remove(STATUS_FIELD);
                Ok(Self::JoinRoom {
                    room_id,
                    state: fields,
                })
            }
            kind::LEAVE_ROOM => Ok(Self::LeaveRoom {
                room_id: take_room_id(&mut fields)?,
            }),
            _ => Ok(Self::Unrecognized {
                tag,
                frame: Frame::from(text),
            }),
        }
    }
}

fn take_room_id(fields: &mut DrawingState) -> Result<RoomId, DecodeError> {
    match fields.remove(ROOM_ID_FIELD) {
        Some(Value::String(id)) => Ok(RoomId::from(id)),
        _ => Err(DecodeError::MissingField(ROOM_ID_FIELD)),
    }
}

/// Messages produced by the relay itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Identity assignment, always the first frame on a connection
    #[serde(rename = "id")]
    Id { message: ClientId },
    #[serde(rename = "room-created")]
    RoomCreated {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    /// Join acknowledgement echoing the joiner's drawing state
    #[serde(rename = "join-room")]
    Joined {
        status: u16,
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(flatten)]
        state: DrawingState,
    },
    #[serde(rename = "join-room")]
    AlreadyJoined {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        message: String,
    },
    #[serde(rename = "join-room")]
    RoomNotFound {
        status: u16,
        #[serde(rename = "roomId")]
        room_id: RoomId,
        message: String,
    },
    #[serde(rename = "leave-room")]
    Left {
        status: u16,
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    #[serde(rename = "someone-joined-room")]
    SomeoneJoined { id: ClientId },
    #[serde(rename = "someone-left-room")]
    SomeoneLeft { id: ClientId },
}

impl ServerMessage {
    pub fn joined(room_id: RoomId, state: DrawingState) -> Self {
        Self::Joined {
            status: STATUS_OK,
            room_id,
            state,
        }
    }

    pub fn already_joined(room_id: RoomId) -> Self {
        Self::AlreadyJoined {
            room_id,
            message: "Room already joined.".to_string(),
        }
    }

    pub fn room_not_found(room_id: RoomId) -> Self {
        Self::RoomNotFound {
            status: STATUS_NOT_FOUND,
            room_id,
            message: "Room not found.".to_string(),
        }
    }

    pub fn left(room_id: RoomId, was_member: bool) -> Self {
        Self::Left {
            status: if was_member { STATUS_OK } else { STATUS_NOT_FOUND },
            room_id,
        }
    }

    /// Encode for the wire.
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}
