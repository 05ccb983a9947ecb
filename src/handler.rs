//! WebSocket connection handler
//!
//! One task per client connection: WebSocket handshake, room selection from
//! the request path (`/chat/{roomCode}`), inbound event parsing and routing
//! into the SessionHub, and a write loop draining the session's outbound
//! channel. The leave path runs exactly once whether the client sends an
//! explicit LEAVE or the transport just closes.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::hub::SessionHub;
use crate::message::{ChatMessage, InboundEvent, MessageType};
use crate::registry::RoomRegistry;
use crate::types::{RoomCode, SessionId};

/// Extract the room code from a `/chat/{roomCode}` request path.
fn parse_room_path(path: &str) -> Option<RoomCode> {
    let code = path.strip_prefix("/chat/")?;
    if code.is_empty() || code.contains('/') {
        return None;
    }
    Some(RoomCode::from_string(code.to_string()))
}

/// Handle a new TCP connection for its whole lifetime.
///
/// The room code is validated against the registry before any session state
/// is created; connections to unknown or inactive rooms are dropped.
pub async fn handle_connection(
    stream: TcpStream,
    registry: RoomRegistry,
    hub: SessionHub,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // Capture the request path during the handshake.
    let mut request_path: Option<String> = None;
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, res: Response| {
        request_path = Some(req.uri().path().to_string());
        Ok(res)
    })
    .await?;

    let room_code = parse_room_path(request_path.as_deref().unwrap_or("")).ok_or_else(|| {
        AppError::Validation("expected connection path /chat/{roomCode}".into())
    })?;
    let room = registry.get_by_code(&room_code).await?;
    if !room.is_active {
        return Err(AppError::NotFound("room"));
    }

    let session_id = SessionId::new();
    info!(%session_id, room = %room_code, peer = %peer_addr, "session connected");

    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = SessionHub::session_channel();

    // Write task: hub broadcasts -> WebSocket.
    let write_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    // Skip this message rather than killing the connection.
                    error!("failed to serialize broadcast: {}", e);
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    // Read loop: WebSocket -> hub. `joined` holds the registered username
    // once the client has sent its JOIN event.
    let mut joined: Option<String> = None;
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = match serde_json::from_str::<InboundEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%session_id, "invalid JSON event: {}", e);
                        continue;
                    }
                };
                if let Err(e) = event.validate() {
                    warn!(%session_id, "rejected event: {}", e);
                    continue;
                }
                match event.kind {
                    MessageType::Join => {
                        if joined.is_some() {
                            warn!(%session_id, "duplicate JOIN ignored");
                            continue;
                        }
                        let username = event.sender.trim().to_string();
                        hub.join(
                            room_code.clone(),
                            session_id,
                            username.clone(),
                            msg_tx.clone(),
                        )
                        .await?;
                        joined = Some(username);
                    }
                    MessageType::Chat => {
                        let Some(username) = &joined else {
                            warn!(%session_id, "CHAT before JOIN ignored");
                            continue;
                        };
                        // Timestamp is stamped here, server-side; whatever
                        // the client sent was discarded at parse time.
                        hub.send(room_code.clone(), ChatMessage::chat(username, event.content))
                            .await?;
                    }
                    MessageType::Leave => {
                        if let Some(username) = joined.take() {
                            hub.leave(room_code.clone(), session_id, username).await?;
                        }
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!(%session_id, "client sent close frame");
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(_) => {} // binary and friends are ignored
            Err(e) => {
                error!(%session_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    // Transport closed without an explicit LEAVE; deregister exactly once.
    if let Some(username) = joined.take() {
        let _ = hub.leave(room_code.clone(), session_id, username).await;
    }

    // Dropping our sender lets the write task drain and close the socket
    // once the hub has released its clone.
    drop(msg_tx);
    let _ = write_task.await;

    info!(%session_id, "session disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_room_path_accepts_chat_paths() {
        let code = parse_room_path("/chat/ab12cd34").unwrap();
        assert_eq!(code.as_str(), "AB12CD34");
    }

    #[test]
    fn test_parse_room_path_rejects_other_paths() {
        assert!(parse_room_path("/").is_none());
        assert!(parse_room_path("/chat/").is_none());
        assert!(parse_room_path("/chat/AB/extra").is_none());
        assert!(parse_room_path("/topic/AB12CD34").is_none());
    }
}
