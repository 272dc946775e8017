//! Change detection for replicated state

use std::collections::HashMap;

use crate::ws::protocol::{PlayerSnapshot, ServerMsg};

use super::state::{RoomState, SessionId};

/// One replicated change to the set of players
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Added(PlayerSnapshot),
    Changed(PlayerSnapshot),
    Removed(SessionId),
}

impl From<StateChange> for ServerMsg {
    fn from(change: StateChange) -> Self {
        match change {
            StateChange::Added(player) => ServerMsg::PlayerAdded { player },
            StateChange::Changed(player) => ServerMsg::PlayerChanged { player },
            StateChange::Removed(session_id) => ServerMsg::PlayerRemoved { session_id },
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Delivered {
    revision: u64,
    snapshot: PlayerSnapshot,
}

/// Tracks what every subscriber has been told and computes what changed since
#[derive(Debug, Default)]
pub struct StateReplicator {
    delivered: HashMap<SessionId, Delivered>,
}

impl StateReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare the room against the last delivered view.
    ///
    /// Additions come first, then field changes, then removals. The returned
    /// changes become the new delivered view, so calling this twice without a
    /// mutation in between yields nothing the second time.
    pub fn diff(&mut self, state: &RoomState) -> Vec<StateChange> {
        let mut added = Vec::new();
        let mut changed = Vec::new();

        for (id, player) in &state.players {
            match self.delivered.get_mut(id) {
                None => {
                    let snapshot = player.snapshot();
                    self.delivered.insert(
                        *id,
                        Delivered {
                            revision: player.revision(),
                            snapshot,
                        },
                    );
                    added.push(StateChange::Added(snapshot));
                }
                Some(last) if last.revision != player.revision() => {
                    last.revision = player.revision();
                    let snapshot = player.snapshot();
                    if snapshot != last.snapshot {
                        last.snapshot = snapshot;
                        changed.push(StateChange::Changed(snapshot));
                    }
                }
                Some(_) => {}
            }
        }

        let removed: Vec<SessionId> = self
            .delivered
            .keys()
            .filter(|id| !state.players.contains_key(*id))
            .copied()
            .collect();
        for id in &removed {
            self.delivered.remove(id);
        }

        added
            .into_iter()
            .chain(changed)
            .chain(removed.into_iter().map(StateChange::Removed))
            .collect()
    }

    /// The view subscribers currently hold, for bringing a new subscriber up to date
    pub fn delivered(&self) -> Vec<PlayerSnapshot> {
        self.delivered.values().map(|d| d.snapshot).collect()
    }
}
