//! Authoritative room simulation modules

pub mod input;
pub mod registry;
pub mod replicator;
pub mod room;
pub mod simulator;
pub mod state;
pub mod track;

pub use input::{InputChannel, InputFrame, InputSender};
pub use registry::{RegistryError, SessionRegistry};
pub use replicator::{StateChange, StateReplicator};
pub use room::{
    GameRoom, JoinTicket, ResyncTicket, RoomConfig, RoomError, RoomHandle, RoomRegistry,
};
pub use simulator::AuthoritativeSimulator;
pub use state::{PlayerState, RoomState, SessionId};
pub use track::{Checkpoint, CheckpointSequence, TrackGrid};
