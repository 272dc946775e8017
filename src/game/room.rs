//! Room task: owns one room's registry, simulator and replicator

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

use super::input::InputSender;
use super::registry::{RegistryError, SessionRegistry};
use super::replicator::StateReplicator;
use super::simulator::AuthoritativeSimulator;
use super::state::{RoomState, SessionId};

/// Room creation settings
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub name: String,
    pub map_width: f32,
    pub map_height: f32,
    /// How often the host loop wakes up; independent of the fixed step
    pub host_interval: Duration,
}

/// Errors surfaced to a connection trying to enter a room
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("unknown room type: {0}")]
    UnknownRoom(String),

    #[error("room is shutting down")]
    Closed,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Commands applied by the room task between ticks
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session_id: SessionId,
        reply: oneshot::Sender<Result<JoinTicket, RegistryError>>,
    },
    Leave {
        session_id: SessionId,
    },
    /// Fresh full view for a connection whose update stream lagged
    Resync {
        reply: oneshot::Sender<ResyncTicket>,
    },
}

/// Everything a connection needs after a successful join
#[derive(Debug)]
pub struct JoinTicket {
    pub room_id: Uuid,
    pub session_id: SessionId,
    pub input_tx: InputSender,
    /// Subscribed at the same moment `welcome` was captured
    pub updates: broadcast::Receiver<ServerMsg>,
    /// `RoomJoined` message describing the room as subscribers currently see it
    pub welcome: ServerMsg,
}

/// Replacement update stream plus the view it continues from
#[derive(Debug)]
pub struct ResyncTicket {
    pub updates: broadcast::Receiver<ServerMsg>,
    /// `Resync` message with every player as subscribers currently see it
    pub view: ServerMsg,
}

/// Handle to a running room
#[derive(Clone)]
pub struct RoomHandle {
    pub id: Uuid,
    command_tx: mpsc::Sender<RoomCommand>,
    player_count: Arc<AtomicUsize>,
}

impl RoomHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    pub async fn join(&self, session_id: SessionId) -> Result<JoinTicket, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Join { session_id, reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        Ok(rx.await.map_err(|_| RoomError::Closed)??)
    }

    /// Ask the room for a new subscription after the old one lagged
    pub async fn resync(&self) -> Result<ResyncTicket, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(RoomCommand::Resync { reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    pub async fn leave(&self, session_id: SessionId) {
        if self
            .command_tx
            .send(RoomCommand::Leave { session_id })
            .await
            .is_err()
        {
            debug!(room_id = %self.id, session_id = %session_id, "Leave after room closed");
        }
    }
}

/// Registry of all active rooms
pub struct RoomRegistry {
    config: RoomConfig,
    rooms: DashMap<Uuid, RoomHandle>,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            rooms: DashMap::new(),
        }
    }

    pub fn room_name(&self) -> &str {
        &self.config.name
    }

    pub fn get(&self, id: &Uuid) -> Option<RoomHandle> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub fn total_players(&self) -> usize {
        self.rooms.iter().map(|r| r.value().player_count()).sum()
    }

    /// Join a running room of the given type, creating one if none is open
    pub async fn join_or_create(
        self: &Arc<Self>,
        room_name: &str,
        session_id: SessionId,
    ) -> Result<JoinTicket, RoomError> {
        if room_name != self.config.name {
            return Err(RoomError::UnknownRoom(room_name.to_string()));
        }

        loop {
            let handle = self.find_open().unwrap_or_else(|| self.spawn_room());
            match handle.join(session_id).await {
                Err(RoomError::Closed) => {
                    // The room emptied out between lookup and join
                    self.rooms.remove(&handle.id);
                }
                result => return result,
            }
        }
    }

    fn find_open(&self) -> Option<RoomHandle> {
        self.rooms
            .iter()
            .map(|r| r.value().clone())
            .find(|h| !h.is_closed())
    }

    fn spawn_room(self: &Arc<Self>) -> RoomHandle {
        let (room, handle) = GameRoom::new(Uuid::new_v4(), self.config.clone());
        self.rooms.insert(handle.id, handle.clone());

        let registry = Arc::clone(self);
        let room_id = handle.id;
        tokio::spawn(async move {
            room.run().await;
            registry.rooms.remove(&room_id);
        });

        handle
    }
}

/// The authoritative room
pub struct GameRoom {
    id: Uuid,
    config: RoomConfig,
    registry: SessionRegistry,
    simulator: AuthoritativeSimulator,
    replicator: StateReplicator,
    command_rx: mpsc::Receiver<RoomCommand>,
    updates_tx: broadcast::Sender<ServerMsg>,
    player_count: Arc<AtomicUsize>,
    had_players: bool,
}

impl GameRoom {
    pub fn new(id: Uuid, config: RoomConfig) -> (Self, RoomHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (updates_tx, _) = broadcast::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = RoomHandle {
            id,
            command_tx,
            player_count: player_count.clone(),
        };

        let state = RoomState::new(config.map_width, config.map_height);
        let room = Self {
            id,
            config,
            registry: SessionRegistry::new(state),
            simulator: AuthoritativeSimulator::new(),
            replicator: StateReplicator::new(),
            command_rx,
            updates_tx,
            player_count,
            had_players: false,
        };

        (room, handle)
    }

    /// Run the host loop until the room empties out
    pub async fn run(mut self) {
        info!(room_id = %self.id, room = %self.config.name, "Room created");

        let mut host_interval = interval(self.config.host_interval);
        host_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            host_interval.tick().await;

            if !self.process_commands() {
                break;
            }

            let now = Instant::now();
            self.advance(now - last);
            last = now;

            if self.had_players && self.registry.player_count() == 0 {
                info!(room_id = %self.id, "All players left, disposing room");
                break;
            }
        }

        self.command_rx.close();
        info!(room_id = %self.id, tick = self.simulator.tick(), "Room disposed");
    }

    /// Apply pending join/leave commands. Returns false once every handle is gone.
    fn process_commands(&mut self) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(RoomCommand::Join { session_id, reply }) => {
                    let result = self.handle_join(session_id);
                    let joined = result.is_ok();
                    if reply.send(result).is_err() && joined {
                        // Connection gave up while waiting; undo the join
                        self.handle_leave(session_id);
                    }
                }
                Ok(RoomCommand::Leave { session_id }) => self.handle_leave(session_id),
                Ok(RoomCommand::Resync { reply }) => {
                    // Receiver gone means the connection already closed
                    let _ = reply.send(self.handle_resync());
                }
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Feed elapsed wall-clock time and run every tick that is due,
    /// replicating after each one
    pub fn advance(&mut self, elapsed: Duration) {
        self.simulator.accumulate(elapsed);
        while let Some(report) = self.simulator.step_due(&mut self.registry) {
            if report.frames_applied > 0 {
                debug!(
                    room_id = %self.id,
                    tick = report.tick,
                    frames = report.frames_applied,
                    players = report.players_moved,
                    "Tick applied input"
                );
            }
            self.replicate();
        }
    }

    fn handle_join(&mut self, session_id: SessionId) -> Result<JoinTicket, RegistryError> {
        // Bring subscribers up to date first so the welcome view is exact
        self.replicate();

        let (player, input_tx) = match self.registry.join(session_id) {
            Ok(joined) => joined,
            Err(e) => {
                warn!(room_id = %self.id, error = %e, "Rejected join");
                return Err(e);
            }
        };

        let welcome = ServerMsg::RoomJoined {
            room_id: self.id,
            session_id,
            room: self.registry.state().info(),
            players: self.replicator.delivered(),
        };
        let updates = self.updates_tx.subscribe();

        self.had_players = true;
        self.sync_player_count();

        info!(
            room_id = %self.id,
            session_id = %session_id,
            spawn_x = player.x,
            spawn_y = player.y,
            player_count = self.registry.player_count(),
            "Player joined room"
        );

        // Announces the newcomer to everyone, itself included
        self.replicate();

        Ok(JoinTicket {
            room_id: self.id,
            session_id,
            input_tx,
            updates,
            welcome,
        })
    }

    fn handle_resync(&mut self) -> ResyncTicket {
        self.replicate();
        ResyncTicket {
            view: ServerMsg::Resync {
                players: self.replicator.delivered(),
            },
            updates: self.updates_tx.subscribe(),
        }
    }

    fn handle_leave(&mut self, session_id: SessionId) {
        match self.registry.leave(session_id) {
            Ok(_) => {
                self.sync_player_count();
                info!(
                    room_id = %self.id,
                    session_id = %session_id,
                    player_count = self.registry.player_count(),
                    "Player left room"
                );
                self.replicate();
            }
            Err(e) => {
                warn!(room_id = %self.id, error = %e, "Inconsistent leave");
            }
        }
    }

    /// Broadcast everything that changed since the last delivery
    fn replicate(&mut self) {
        for change in self.replicator.diff(self.registry.state()) {
            // No receivers is fine: nobody left to tell
            let _ = self.updates_tx.send(change.into());
        }
    }

    fn sync_player_count(&self) {
        self.player_count
            .store(self.registry.player_count(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::InputFrame;
    use crate::game::registry::{SPAWN_BASE_X, SPAWN_SPACING};
    use tokio_test::{assert_err, assert_ok};

    fn config() -> RoomConfig {
        RoomConfig {
            name: "race_room".to_string(),
            map_width: 800.0,
            map_height: 600.0,
            host_interval: Duration::from_millis(5),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn join_welcomes_and_announces() {
        let (mut room, _handle) = GameRoom::new(Uuid::new_v4(), config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let mut ticket_a = assert_ok!(room.handle_join(a));
        match &ticket_a.welcome {
            ServerMsg::RoomJoined {
                session_id,
                room: info,
                players,
                ..
            } => {
                assert_eq!(*session_id, a);
                assert_eq!(info.map_width, 800.0);
                assert!(players.is_empty());
            }
            other => panic!("unexpected welcome: {other:?}"),
        }

        let ticket_b = assert_ok!(room.handle_join(b));
        match &ticket_b.welcome {
            ServerMsg::RoomJoined { players, .. } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].session_id, a);
                assert_eq!(players[0].x, SPAWN_BASE_X);
            }
            other => panic!("unexpected welcome: {other:?}"),
        }

        // A sees itself added, then B
        let seen = drain(&mut ticket_a.updates);
        let added: Vec<(Uuid, f32)> = seen
            .iter()
            .filter_map(|m| match m {
                ServerMsg::PlayerAdded { player } => Some((player.session_id, player.x)),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec![(a, SPAWN_BASE_X), (b, SPAWN_BASE_X - SPAWN_SPACING)]);
    }

    #[test]
    fn duplicate_join_is_refused_without_disturbing_the_room() {
        let (mut room, _handle) = GameRoom::new(Uuid::new_v4(), config());
        let a = Uuid::new_v4();

        assert_ok!(room.handle_join(a));
        let err = assert_err!(room.handle_join(a));
        assert_eq!(err, RegistryError::AlreadyJoined(a));
        assert_eq!(room.registry.player_count(), 1);
    }

    #[test]
    fn tick_broadcasts_post_integration_state_and_removal_once() {
        let (mut room, handle) = GameRoom::new(Uuid::new_v4(), config());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ticket_a = assert_ok!(room.handle_join(a));
        let mut ticket_b = assert_ok!(room.handle_join(b));
        drain(&mut ticket_b.updates);
        assert_eq!(handle.player_count(), 2);

        for tick in 1..=3 {
            ticket_a
                .input_tx
                .push(InputFrame {
                    up: true,
                    tick,
                    velocity_x: 2.0,
                    ..Default::default()
                })
                .unwrap();
        }
        room.advance(Duration::from_millis(20));

        let seen = drain(&mut ticket_b.updates);
        match seen.as_slice() {
            [ServerMsg::PlayerChanged { player }] => {
                assert_eq!(player.session_id, a);
                assert_eq!(player.x, SPAWN_BASE_X + 6.0);
                assert_eq!(player.tick, 3);
            }
            other => panic!("unexpected updates: {other:?}"),
        }

        room.handle_leave(a);
        room.handle_leave(a);
        let removed: Vec<ServerMsg> = drain(&mut ticket_b.updates);
        assert_eq!(removed, vec![ServerMsg::PlayerRemoved { session_id: a }]);
        assert!(!room.registry.contains(&a));
        assert_eq!(handle.player_count(), 1);
    }

    #[test]
    fn lagged_connection_recovers_full_player_set() {
        use crate::client::ClientSession;
        use crate::game::track::{CheckpointSequence, TrackGrid};
        use tokio::sync::broadcast::error::TryRecvError;

        let (mut room, _handle) = GameRoom::new(Uuid::new_v4(), config());
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let ticket_a = assert_ok!(room.handle_join(a));
        let mut client = ClientSession::new(
            Default::default(),
            Arc::new(TrackGrid::default()),
            CheckpointSequence::default(),
            (),
        );
        assert_ok!(client.handle_server_msg(ticket_a.welcome));
        let mut updates = ticket_a.updates;

        // A stops reading while B joins, drives around and C comes and goes
        let ticket_b = assert_ok!(room.handle_join(b));
        assert_ok!(room.handle_join(c));
        room.handle_leave(c);
        for tick in 1..=300 {
            ticket_b
                .input_tx
                .push(InputFrame {
                    tick,
                    velocity_x: 1.0,
                    ..Default::default()
                })
                .unwrap();
            room.advance(Duration::from_millis(17));
        }

        let mut lagged = false;
        loop {
            match updates.try_recv() {
                Ok(msg) => assert_ok!(client.handle_server_msg(msg)),
                Err(TryRecvError::Lagged(_)) => {
                    lagged = true;
                    let sync = room.handle_resync();
                    updates = sync.updates;
                    assert_ok!(client.handle_server_msg(sync.view));
                }
                Err(_) => break,
            }
        }

        assert!(lagged);
        assert!(client.local().is_some());
        assert_eq!(client.remote_count(), 1);
        assert!(client.remote(&c).is_none());
        let server_b = &room.registry.state().players[&b];
        assert_eq!(
            client.remote(&b).unwrap().target(),
            Some((server_b.x, server_b.y))
        );
    }

    #[tokio::test]
    async fn registry_routes_joins_to_one_room() {
        let registry = Arc::new(RoomRegistry::new(config()));

        let first = assert_ok!(registry.join_or_create("race_room", Uuid::new_v4()).await);
        let second = assert_ok!(registry.join_or_create("race_room", Uuid::new_v4()).await);
        assert_eq!(first.room_id, second.room_id);
        assert_eq!(registry.active_rooms(), 1);

        let wrong = registry.join_or_create("lobby", Uuid::new_v4()).await;
        assert!(matches!(wrong, Err(RoomError::UnknownRoom(name)) if name == "lobby"));
    }

    #[tokio::test]
    async fn resync_through_running_room_lists_current_players() {
        let registry = Arc::new(RoomRegistry::new(config()));
        let id = Uuid::new_v4();

        let ticket = assert_ok!(registry.join_or_create("race_room", id).await);
        let handle = registry.get(&ticket.room_id).unwrap();
        let sync = assert_ok!(handle.resync().await);
        match sync.view {
            ServerMsg::Resync { players } => {
                assert_eq!(players.len(), 1);
                assert_eq!(players[0].session_id, id);
            }
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[tokio::test]
    async fn room_disposes_after_last_leave() {
        let registry = Arc::new(RoomRegistry::new(config()));
        let id = Uuid::new_v4();

        let ticket = assert_ok!(registry.join_or_create("race_room", id).await);
        let handle = registry.get(&ticket.room_id).unwrap();
        handle.leave(id).await;

        for _ in 0..100 {
            if registry.active_rooms() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.active_rooms(), 0);
    }
}
