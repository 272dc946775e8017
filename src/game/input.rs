//! Per-session input frames and the channel that buffers them

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One client fixed-step snapshot of directional intent and computed velocity.
///
/// The velocity is computed by the client and trusted as-is by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    /// Client-local tick counter at capture time
    pub tick: u64,
    pub velocity_x: f32,
    pub velocity_y: f32,
}

/// Sending half of an [`InputChannel`], held by the owning connection
#[derive(Debug, Clone)]
pub struct InputSender {
    tx: mpsc::UnboundedSender<InputFrame>,
}

impl InputSender {
    /// Append a frame. Fails only once the session has left the room.
    pub fn push(&self, frame: InputFrame) -> Result<(), InputClosed> {
        self.tx.send(frame).map_err(|_| InputClosed)
    }
}

/// The session's input channel has been dropped by the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("input channel closed")]
pub struct InputClosed;

/// Unbounded FIFO of frames for one session.
///
/// Single writer (the connection, through [`InputSender`]) and single reader
/// (the room's simulator). Frames are never reordered or dropped; the only
/// way out of the queue is [`InputChannel::next_frame`].
#[derive(Debug)]
pub struct InputChannel {
    rx: mpsc::UnboundedReceiver<InputFrame>,
}

impl InputChannel {
    pub fn new() -> (InputSender, InputChannel) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InputSender { tx }, InputChannel { rx })
    }

    /// Dequeue the oldest pending frame, if any
    pub fn next_frame(&mut self) -> Option<InputFrame> {
        self.rx.try_recv().ok()
    }
}
