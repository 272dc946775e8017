//! Client world: local prediction, remote smoothing and presentation hooks

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::game::state::SessionId;
use crate::game::track::{CheckpointSequence, TrackGrid};
use crate::util::time::FixedTimestep;
use crate::ws::protocol::{ClientMsg, PlayerSnapshot, RoomInfo, ServerMsg};

use super::collision::{resolve_collisions, LocalBody, CAR_WIDTH};
use super::input::KeyboardState;
use super::interpolator::RemoteInterpolator;
use super::lap::{LapEvent, LapProgress};
use super::predictor::{ClientPredictor, PredictionConfig, Reconciliation};

/// Client-side failures; none of them are fatal to the process
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to room: {0}")]
    ConnectFailed(String),

    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(String),
}

impl ConnectionStatus {
    /// Status line for the presentation layer
    pub fn message(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Trying to connect with the server...",
            ConnectionStatus::Connected => "",
            ConnectionStatus::Failed(_) => "Could not connect with the server.",
        }
    }
}

/// Callbacks consumed by rendering/HUD code. All methods default to no-ops.
pub trait PresentationHooks {
    fn on_entity_added(&mut self, _player: &PlayerSnapshot, _is_local: bool) {}
    fn on_entity_changed(&mut self, _player: &PlayerSnapshot) {}
    fn on_entity_removed(&mut self, _session_id: SessionId) {}
    fn on_lap_completed(&mut self, _lap: u32) {}
    fn on_race_finished(&mut self) {}
    fn on_connection_status(&mut self, _status: &ConnectionStatus) {}
}

impl PresentationHooks for () {}

#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub prediction: PredictionConfig,
    pub car_width: f32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            prediction: PredictionConfig::default(),
            car_width: CAR_WIDTH,
        }
    }
}

/// Everything one client knows about the room
pub struct ClientSession<H: PresentationHooks = ()> {
    config: ClientConfig,
    track: Arc<TrackGrid>,
    checkpoints: CheckpointSequence,
    hooks: H,
    status: ConnectionStatus,
    session_id: Option<SessionId>,
    room: Option<RoomInfo>,
    clock: FixedTimestep,
    local: Option<ClientPredictor>,
    /// Latest server view of the local car, for debug overlays
    local_server: Option<PlayerSnapshot>,
    remotes: HashMap<SessionId, RemoteInterpolator>,
}

impl<H: PresentationHooks> ClientSession<H> {
    pub fn new(
        config: ClientConfig,
        track: Arc<TrackGrid>,
        checkpoints: CheckpointSequence,
        hooks: H,
    ) -> Self {
        Self {
            config,
            track,
            checkpoints,
            hooks,
            status: ConnectionStatus::Connecting,
            session_id: None,
            room: None,
            clock: FixedTimestep::default(),
            local: None,
            local_server: None,
            remotes: HashMap::new(),
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn room(&self) -> Option<RoomInfo> {
        self.room
    }

    pub fn local(&self) -> Option<&ClientPredictor> {
        self.local.as_ref()
    }

    pub fn local_server(&self) -> Option<&PlayerSnapshot> {
        self.local_server.as_ref()
    }

    pub fn remote(&self, id: &SessionId) -> Option<&RemoteInterpolator> {
        self.remotes.get(id)
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Report a failed connection attempt. No retry is attempted.
    pub fn connection_failed(&mut self, error: &ClientError) {
        warn!(error = %error, "Connection to room failed");
        self.set_status(ConnectionStatus::Failed(error.to_string()));
    }

    /// Apply one message from the server as soon as it arrives
    pub fn handle_server_msg(&mut self, msg: ServerMsg) -> Result<(), ClientError> {
        match msg {
            ServerMsg::RoomJoined {
                room_id,
                session_id,
                room,
                players,
            } => {
                info!(room_id = %room_id, session_id = %session_id, "Joined room");
                self.session_id = Some(session_id);
                self.room = Some(room);
                self.set_status(ConnectionStatus::Connected);
                for player in players {
                    self.add_entity(player);
                }
            }
            ServerMsg::PlayerAdded { player } => self.add_entity(player),
            ServerMsg::PlayerChanged { player } => self.change_entity(player),
            ServerMsg::PlayerRemoved { session_id } => self.remove_entity(session_id),
            ServerMsg::Resync { players } => self.resync(players),
            ServerMsg::Error { code, message } => {
                return Err(ClientError::Server { code, message });
            }
        }
        Ok(())
    }

    /// Advance local fixed steps for the elapsed frame time.
    ///
    /// Returns the input messages to send, one per step taken.
    pub fn update(&mut self, elapsed: Duration, keys: &KeyboardState) -> Vec<ClientMsg> {
        if self.local.is_none() {
            return Vec::new();
        }

        self.clock.accumulate(elapsed);
        let mut outgoing = Vec::new();
        while self.clock.consume_step() {
            if let Some(msg) = self.fixed_tick(keys) {
                outgoing.push(msg);
            }
        }
        outgoing
    }

    fn fixed_tick(&mut self, keys: &KeyboardState) -> Option<ClientMsg> {
        let local = self.local.as_mut()?;
        let predicted = local.fixed_tick(keys.sample());

        match predicted.lap {
            LapEvent::LapCompleted(lap) => self.hooks.on_lap_completed(lap),
            LapEvent::Finished => {
                info!("Race finished");
                self.hooks.on_race_finished();
            }
            LapEvent::Checkpoint(_) | LapEvent::None => {}
        }

        for remote in self.remotes.values_mut() {
            remote.tick();
        }
        self.resolve_local_collisions();

        predicted.frame.map(ClientMsg::Input)
    }

    fn resolve_local_collisions(&mut self) {
        let (Some(local_id), Some(local)) = (self.session_id, self.local.as_mut()) else {
            return;
        };

        let width = self.config.car_width;
        let mut bodies: Vec<LocalBody> = std::iter::once(LocalBody {
            id: local_id,
            x: local.x,
            y: local.y,
            width,
        })
        .chain(self.remotes.iter().map(|(id, r)| LocalBody {
            id: *id,
            x: r.x,
            y: r.y,
            width,
        }))
        .collect();

        let mut velocity = (local.velocity_x, local.velocity_y);
        if resolve_collisions(&mut bodies, local_id, &mut velocity) == 0 {
            return;
        }

        local.velocity_x = velocity.0;
        local.velocity_y = velocity.1;
        for body in bodies {
            if body.id == local_id {
                local.x = body.x;
                local.y = body.y;
            } else if let Some(remote) = self.remotes.get_mut(&body.id) {
                remote.x = body.x;
                remote.y = body.y;
            }
        }
    }

    fn add_entity(&mut self, player: PlayerSnapshot) {
        let id = player.session_id;
        let is_local = self.session_id == Some(id);

        if is_local {
            if self.local.is_some() {
                debug!(session_id = %id, "Duplicate add for local car");
                return;
            }
            self.local = Some(ClientPredictor::new(
                self.config.prediction,
                Arc::clone(&self.track),
                LapProgress::new(self.checkpoints.clone()),
                player.x,
                player.y,
            ));
            self.local_server = Some(player);
        } else {
            if self.remotes.contains_key(&id) {
                debug!(session_id = %id, "Duplicate add for remote car");
                return;
            }
            let mut remote = RemoteInterpolator::new(player.x, player.y);
            remote.set_target(player.x, player.y);
            self.remotes.insert(id, remote);
        }

        self.hooks.on_entity_added(&player, is_local);
    }

    fn change_entity(&mut self, player: PlayerSnapshot) {
        let id = player.session_id;

        if self.session_id == Some(id) {
            let Some(local) = self.local.as_mut() else {
                debug!(session_id = %id, "Change for local car before it was added");
                return;
            };
            if local.reconcile(&player) == Reconciliation::Snapped {
                debug!(
                    session_id = %id,
                    x = player.x,
                    y = player.y,
                    "Snapped prediction to server position"
                );
            }
            self.local_server = Some(player);
        } else if let Some(remote) = self.remotes.get_mut(&id) {
            remote.set_target(player.x, player.y);
        } else {
            debug!(session_id = %id, "Change for unknown car");
            return;
        }

        self.hooks.on_entity_changed(&player);
    }

    fn remove_entity(&mut self, session_id: SessionId) {
        let known = if self.session_id == Some(session_id) {
            self.local_server = None;
            self.local.take().is_some()
        } else {
            self.remotes.remove(&session_id).is_some()
        };

        if known {
            self.hooks.on_entity_removed(session_id);
        } else {
            debug!(session_id = %session_id, "Removal for unknown car");
        }
    }

    /// Replace the known car set with the server's full view
    fn resync(&mut self, players: Vec<PlayerSnapshot>) {
        let listed: HashSet<SessionId> = players.iter().map(|p| p.session_id).collect();
        info!(players = listed.len(), "Resynchronizing with room");

        let local_stale = self
            .session_id
            .filter(|id| self.local.is_some() && !listed.contains(id));
        let stale: Vec<SessionId> = self
            .remotes
            .keys()
            .filter(|id| !listed.contains(id))
            .copied()
            .chain(local_stale)
            .collect();
        for id in stale {
            self.remove_entity(id);
        }

        for player in players {
            let id = player.session_id;
            let known = if self.session_id == Some(id) {
                self.local.is_some()
            } else {
                self.remotes.contains_key(&id)
            };
            if known {
                self.change_entity(player);
            } else {
                self.add_entity(player);
            }
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.hooks.on_connection_status(&self.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::input::Key;
    use crate::game::registry::{SPAWN_BASE_X, SPAWN_BASE_Y, SPAWN_SPACING};
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        added: Vec<(SessionId, bool)>,
        changed: usize,
        removed: Vec<SessionId>,
        statuses: Vec<ConnectionStatus>,
    }

    impl PresentationHooks for Recorder {
        fn on_entity_added(&mut self, player: &PlayerSnapshot, is_local: bool) {
            self.added.push((player.session_id, is_local));
        }
        fn on_entity_changed(&mut self, _player: &PlayerSnapshot) {
            self.changed += 1;
        }
        fn on_entity_removed(&mut self, session_id: SessionId) {
            self.removed.push(session_id);
        }
        fn on_connection_status(&mut self, status: &ConnectionStatus) {
            self.statuses.push(status.clone());
        }
    }

    fn snapshot(id: SessionId, x: f32, y: f32) -> PlayerSnapshot {
        PlayerSnapshot {
            session_id: id,
            x,
            y,
            velocity_x: 0.0,
            velocity_y: 0.0,
            tick: 0,
        }
    }

    fn session() -> ClientSession<Recorder> {
        ClientSession::new(
            ClientConfig::default(),
            Arc::new(TrackGrid::default()),
            CheckpointSequence::default(),
            Recorder::default(),
        )
    }

    /// Joins as `me` into a room that already holds `other`
    fn joined(me: SessionId, other: SessionId) -> ClientSession<Recorder> {
        let mut client = session();
        client
            .handle_server_msg(ServerMsg::RoomJoined {
                room_id: Uuid::new_v4(),
                session_id: me,
                room: RoomInfo {
                    map_width: 800.0,
                    map_height: 600.0,
                },
                players: vec![snapshot(other, SPAWN_BASE_X, SPAWN_BASE_Y)],
            })
            .unwrap();
        client
            .handle_server_msg(ServerMsg::PlayerAdded {
                player: snapshot(me, SPAWN_BASE_X - SPAWN_SPACING, SPAWN_BASE_Y),
            })
            .unwrap();
        client
    }

    #[test]
    fn join_populates_local_and_remote_cars() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let client = joined(me, other);

        assert_eq!(client.status(), &ConnectionStatus::Connected);
        assert_eq!(client.hooks().added, vec![(other, false), (me, true)]);
        assert_eq!(client.local().unwrap().x, SPAWN_BASE_X - SPAWN_SPACING);
        assert_eq!(client.remote_count(), 1);
    }

    #[test]
    fn no_input_is_sent_before_local_car_exists() {
        let mut client = session();
        let keys: KeyboardState = [Key::W].into_iter().collect();
        assert!(client.update(Duration::from_millis(100), &keys).is_empty());
    }

    #[test]
    fn update_emits_one_frame_per_fixed_step() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut client = joined(me, other);
        let keys: KeyboardState = [Key::ArrowUp].into_iter().collect();

        let sent = client.update(Duration::from_millis(60), &keys);
        let ticks: Vec<u64> = sent
            .iter()
            .map(|msg| match msg {
                ClientMsg::Input(frame) => frame.tick,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
    }

    #[test]
    fn server_changes_reconcile_local_and_retarget_remote() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut client = joined(me, other);
        let local_x = client.local().unwrap().x;

        // Small divergence is ignored
        client
            .handle_server_msg(ServerMsg::PlayerChanged {
                player: snapshot(me, local_x + 5.0, SPAWN_BASE_Y),
            })
            .unwrap();
        assert_eq!(client.local().unwrap().x, local_x);

        // Large divergence snaps
        client
            .handle_server_msg(ServerMsg::PlayerChanged {
                player: snapshot(me, local_x + 40.0, SPAWN_BASE_Y),
            })
            .unwrap();
        assert_eq!(client.local().unwrap().x, local_x + 40.0);

        client
            .handle_server_msg(ServerMsg::PlayerChanged {
                player: snapshot(other, SPAWN_BASE_X + 100.0, SPAWN_BASE_Y),
            })
            .unwrap();
        assert_eq!(
            client.remote(&other).unwrap().target(),
            Some((SPAWN_BASE_X + 100.0, SPAWN_BASE_Y))
        );
        assert_eq!(client.hooks().changed, 3);
    }

    #[test]
    fn removal_releases_remote_once() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut client = joined(me, other);

        client
            .handle_server_msg(ServerMsg::PlayerRemoved { session_id: other })
            .unwrap();
        client
            .handle_server_msg(ServerMsg::PlayerRemoved { session_id: other })
            .unwrap();

        assert_eq!(client.hooks().removed, vec![other]);
        assert!(client.remote(&other).is_none());
    }

    #[test]
    fn overlapping_cars_are_separated_locally() {
        let (me, other) = (Uuid::new_v4(), Uuid::new_v4());
        let mut client = session();
        client
            .handle_server_msg(ServerMsg::RoomJoined {
                room_id: Uuid::new_v4(),
                session_id: me,
                room: RoomInfo {
                    map_width: 800.0,
                    map_height: 600.0,
                },
                players: vec![
                    snapshot(me, SPAWN_BASE_X, SPAWN_BASE_Y),
                    snapshot(other, SPAWN_BASE_X + 20.0, SPAWN_BASE_Y),
                ],
            })
            .unwrap();

        client.update(Duration::from_millis(20), &KeyboardState::new());

        let local = client.local().unwrap();
        let remote = client.remote(&other).unwrap();
        assert!(remote.x - local.x >= CAR_WIDTH - 1e-3);
        assert!(local.velocity_x < 0.0);
    }

    #[test]
    fn server_error_and_connect_failure_are_reported() {
        let mut client = session();
        let err = client
            .handle_server_msg(ServerMsg::Error {
                code: "unknown_room".to_string(),
                message: "no such room".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::Server { .. }));

        client.connection_failed(&ClientError::ConnectFailed("refused".to_string()));
        assert_eq!(
            client.status().message(),
            "Could not connect with the server."
        );
        assert!(matches!(
            client.hooks().statuses.last(),
            Some(ConnectionStatus::Failed(_))
        ));
    }

    #[test]
    fn resync_drops_ghosts_and_adds_missed_cars() {
        let (me, ghost, missed) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut client = joined(me, ghost);

        client
            .handle_server_msg(ServerMsg::Resync {
                players: vec![
                    snapshot(me, SPAWN_BASE_X - SPAWN_SPACING, SPAWN_BASE_Y),
                    snapshot(missed, 900.0, SPAWN_BASE_Y),
                ],
            })
            .unwrap();

        assert_eq!(client.hooks().removed, vec![ghost]);
        assert!(client.remote(&ghost).is_none());
        assert_eq!(client.remote(&missed).unwrap().x, 900.0);
        assert_eq!(client.remote_count(), 1);
        assert!(client.local().is_some());
        assert_eq!(client.hooks().added.last(), Some(&(missed, false)));
    }
}
