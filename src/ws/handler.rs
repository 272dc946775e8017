//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{InputSender, RoomError, RoomHandle};
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Room type to join; defaults to the configured room
    pub room: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let room_name = query
        .room
        .unwrap_or_else(|| state.rooms.room_name().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, room_name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, room_name: String, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, room = %room_name, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let ticket = match state.rooms.join_or_create(&room_name, session_id).await {
        Ok(ticket) => ticket,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Join failed");
            let _ = send_msg(&mut ws_sink, &join_error(&e)).await;
            return;
        }
    };

    let Some(room) = state.rooms.get(&ticket.room_id) else {
        warn!(session_id = %session_id, room_id = %ticket.room_id, "Room vanished after join");
        return;
    };

    if let Err(e) = send_msg(&mut ws_sink, &ticket.welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
    } else {
        run_session(
            session_id,
            room.clone(),
            ws_sink,
            ws_stream,
            ticket.input_tx,
            ticket.updates,
        )
        .await;
    }

    // Cleanup on disconnect: exactly one leave per joined session
    room.leave(session_id).await;

    info!(session_id = %session_id, "WebSocket connection closed");
}

fn join_error(e: &RoomError) -> ServerMsg {
    let code = match e {
        RoomError::UnknownRoom(_) => "unknown_room",
        RoomError::Closed => "room_closed",
        RoomError::Registry(_) => "join_rejected",
    };
    ServerMsg::Error {
        code: code.to_string(),
        message: e.to_string(),
    }
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    room: RoomHandle,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: InputSender,
    mut updates_rx: broadcast::Receiver<ServerMsg>,
) {
    // Spawn writer task: room updates -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match updates_rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        session_id = %session_id,
                        lagged_count = n,
                        "Client lagged, resyncing after {} missed updates", n
                    );
                    // Missed adds/removes are unrecoverable from deltas alone
                    let sync = match room.resync().await {
                        Ok(sync) => sync,
                        Err(e) => {
                            debug!(session_id = %session_id, error = %e, "Resync failed");
                            break;
                        }
                    };
                    updates_rx = sync.updates;
                    if let Err(e) = send_msg(&mut ws_sink, &sync.view).await {
                        debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session_id, "Room update channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> input channel
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(ClientMsg::Input(frame)) => {
                    if input_tx.push(frame).is_err() {
                        debug!(session_id = %session_id, "Input channel closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
