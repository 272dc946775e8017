//! Session join/leave lifecycle

use std::collections::HashMap;
use tracing::debug;

use super::input::{InputChannel, InputSender};
use super::state::{PlayerState, RoomState, SessionId};

/// Spawn baseline at the finish line
pub const SPAWN_BASE_X: f32 = 1300.0;
pub const SPAWN_BASE_Y: f32 = 1430.0;
/// Distance between consecutive joiners along the x axis
pub const SPAWN_SPACING: f32 = 150.0;

/// Internal invariant violations in the join/leave lifecycle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} already joined this room")]
    AlreadyJoined(SessionId),

    #[error("session {0} is not in this room")]
    UnknownSession(SessionId),
}

/// Owns the room state and every session's input channel
#[derive(Debug)]
pub struct SessionRegistry {
    state: RoomState,
    inputs: HashMap<SessionId, InputChannel>,
}

impl SessionRegistry {
    pub fn new(state: RoomState) -> Self {
        Self {
            state,
            inputs: HashMap::new(),
        }
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.state.players.contains_key(session_id)
    }

    pub fn player_count(&self) -> usize {
        self.state.player_count()
    }

    /// Spawn position for the next joiner: each one lines up behind the last
    pub fn next_spawn_position(&self) -> (f32, f32) {
        let offset = self.state.players.len() as f32 * SPAWN_SPACING;
        (SPAWN_BASE_X - offset, SPAWN_BASE_Y)
    }

    /// Add a session to the room.
    ///
    /// Returns the new player and the sending half of its input channel.
    pub fn join(
        &mut self,
        session_id: SessionId,
    ) -> Result<(PlayerState, InputSender), RegistryError> {
        if self.contains(&session_id) {
            return Err(RegistryError::AlreadyJoined(session_id));
        }

        let (spawn_x, spawn_y) = self.next_spawn_position();
        let player = PlayerState::new(session_id, spawn_x, spawn_y);
        let (input_tx, channel) = InputChannel::new();

        self.state.players.insert(session_id, player.clone());
        self.inputs.insert(session_id, channel);

        debug!(
            session_id = %session_id,
            spawn_x,
            spawn_y,
            "Registered session"
        );

        Ok((player, input_tx))
    }

    /// Remove a session and drop its input channel
    pub fn leave(&mut self, session_id: SessionId) -> Result<PlayerState, RegistryError> {
        self.inputs.remove(&session_id);
        self.state
            .players
            .remove(&session_id)
            .ok_or(RegistryError::UnknownSession(session_id))
    }

    /// Visit every player together with its input channel, for one tick
    pub fn for_each_with_input<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut PlayerState, &mut InputChannel),
    {
        let inputs = &mut self.inputs;
        for (id, player) in self.state.players.iter_mut() {
            if let Some(channel) = inputs.get_mut(id) {
                f(player, channel);
            }
        }
    }
}
