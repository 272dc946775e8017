//! Replicated room state

use std::collections::HashMap;
use uuid::Uuid;

use crate::ws::protocol::{PlayerSnapshot, RoomInfo};

/// Session identifier, unique and stable for the lifetime of a connection
pub type SessionId = Uuid;

/// Default map dimensions for a race room
pub const DEFAULT_MAP_WIDTH: f32 = 800.0;
pub const DEFAULT_MAP_HEIGHT: f32 = 600.0;

/// Player state in a room (authoritative)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: SessionId,

    // Position and movement
    pub x: f32,
    pub y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,

    /// Last client tick integrated; never decreases
    pub last_applied_tick: u64,

    /// Bumped on every mutation, read by the replicator
    revision: u64,
}

impl PlayerState {
    pub fn new(id: SessionId, spawn_x: f32, spawn_y: f32) -> Self {
        Self {
            id,
            x: spawn_x,
            y: spawn_y,
            velocity_x: 0.0,
            velocity_y: 0.0,
            last_applied_tick: 0,
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Record that replicated fields were written
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            session_id: self.id,
            x: self.x,
            y: self.y,
            velocity_x: self.velocity_x,
            velocity_y: self.velocity_y,
            tick: self.last_applied_tick,
        }
    }
}

/// Room-wide replicated state
#[derive(Debug, Clone)]
pub struct RoomState {
    map_width: f32,
    map_height: f32,
    pub players: HashMap<SessionId, PlayerState>,
}

impl RoomState {
    pub fn new(map_width: f32, map_height: f32) -> Self {
        Self {
            map_width,
            map_height,
            players: HashMap::new(),
        }
    }

    pub fn map_width(&self) -> f32 {
        self.map_width
    }

    pub fn map_height(&self) -> f32 {
        self.map_height
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            map_width: self.map_width,
            map_height: self.map_height,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new(DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT)
    }
}
