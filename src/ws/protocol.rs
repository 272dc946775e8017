//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::input::InputFrame;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// One fixed-step input frame, appended to the sender's input channel
    Input(InputFrame),
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once to a connection after it joins a room
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: Uuid,
        /// Session id assigned to the receiving client
        session_id: Uuid,
        room: RoomInfo,
        /// Every player already known to the room at join time
        players: Vec<PlayerSnapshot>,
    },

    /// A session joined the room
    PlayerAdded { player: PlayerSnapshot },

    /// One or more replicated fields of a player changed this tick
    PlayerChanged { player: PlayerSnapshot },

    /// A session left the room
    #[serde(rename_all = "camelCase")]
    PlayerRemoved { session_id: Uuid },

    /// Full player set, replacing whatever the client holds. Sent after the
    /// connection fell behind and missed updates.
    Resync { players: Vec<PlayerSnapshot> },

    /// Error message
    Error { code: String, message: String },
}

/// Room-level replicated scalars
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub map_width: f32,
    pub map_height: f32,
}

/// Replicated view of one player
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub session_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    /// Last client tick the server integrated for this player
    pub tick: u64,
}
