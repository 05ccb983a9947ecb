//! SessionHub: live sessions and per-room fan-out
//!
//! One manager actor owns the map of active rooms; each active room is its
//! own actor task with an mpsc command channel. A room task is the single
//! point of serialization for its room, so delivery order equals arrival
//! order there (room-local FIFO, no cross-room guarantee), and a slow room
//! cannot stall the others.
//!
//! Fan-out is best-effort per recipient: each session has a bounded buffer
//! and delivery uses `try_send`. A full buffer drops that one message for
//! that one session; a closed channel drops the session. Nothing is retried.
//!
//! Room lifecycle is Empty -> Active on first join and back to Empty when
//! the last session leaves, at which point the room task exits.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::message::ChatMessage;
use crate::types::{RoomCode, SessionId};

/// Outbound buffer per session. A session this far behind starts losing
/// messages rather than holding up the room.
const SESSION_BUFFER: usize = 64;

/// Manager command buffer.
const HUB_BUFFER: usize = 256;

/// Per-room command buffer.
const ROOM_BUFFER: usize = 64;

/// Receiving half handed to each connection's write loop.
pub type SessionReceiver = mpsc::Receiver<ChatMessage>;

/// Commands routed to a single room's actor.
#[derive(Debug)]
enum RoomCommand {
    Join {
        session_id: SessionId,
        username: String,
        sender: mpsc::Sender<ChatMessage>,
    },
    Send {
        message: ChatMessage,
    },
    Leave {
        session_id: SessionId,
        username: String,
    },
}

/// Commands accepted by the manager actor.
#[derive(Debug)]
enum HubCommand {
    Join {
        room_code: RoomCode,
        session_id: SessionId,
        username: String,
        sender: mpsc::Sender<ChatMessage>,
    },
    Send {
        room_code: RoomCode,
        message: ChatMessage,
    },
    Leave {
        room_code: RoomCode,
        session_id: SessionId,
        username: String,
    },
}

/// Cloneable handle to the hub.
#[derive(Debug, Clone)]
pub struct SessionHub {
    tx: mpsc::Sender<HubCommand>,
}

impl SessionHub {
    /// Start the manager actor and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(HUB_BUFFER);
        tokio::spawn(
            HubActor {
                rooms: HashMap::new(),
                receiver: rx,
            }
            .run(),
        );
        Self { tx }
    }

    /// Create the outbound channel for a new session.
    pub fn session_channel() -> (mpsc::Sender<ChatMessage>, SessionReceiver) {
        mpsc::channel(SESSION_BUFFER)
    }

    /// Register a session under a room and broadcast the JOIN system message.
    pub async fn join(
        &self,
        room_code: RoomCode,
        session_id: SessionId,
        username: String,
        sender: mpsc::Sender<ChatMessage>,
    ) -> Result<(), AppError> {
        self.tx
            .send(HubCommand::Join {
                room_code,
                session_id,
                username,
                sender,
            })
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Broadcast a message to every session in the room, in arrival order.
    pub async fn send(
        &self,
        room_code: RoomCode,
        message: ChatMessage,
    ) -> Result<(), AppError> {
        self.tx
            .send(HubCommand::Send { room_code, message })
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Deregister a session and broadcast the LEAVE system message.
    ///
    /// Idempotent: a second leave for the same session is a no-op, so an
    /// explicit leave followed by the transport closing yields one LEAVE.
    pub async fn leave(
        &self,
        room_code: RoomCode,
        session_id: SessionId,
        username: String,
    ) -> Result<(), AppError> {
        self.tx
            .send(HubCommand::Leave {
                room_code,
                session_id,
                username,
            })
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}

/// The manager actor: room map plus command loop.
struct HubActor {
    rooms: HashMap<RoomCode, mpsc::Sender<RoomCommand>>,
    receiver: mpsc::Receiver<HubCommand>,
}

impl HubActor {
    async fn run(mut self) {
        info!("session hub started");
        while let Some(cmd) = self.receiver.recv().await {
            self.handle(cmd).await;
        }
        info!("session hub shutting down");
    }

    async fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Join {
                room_code,
                session_id,
                username,
                sender,
            } => {
                let cmd = RoomCommand::Join {
                    session_id,
                    username,
                    sender,
                };
                let tx = self
                    .rooms
                    .entry(room_code.clone())
                    .or_insert_with(|| spawn_room(room_code.clone()))
                    .clone();
                if let Err(SendError(cmd)) = tx.send(cmd).await {
                    // The previous room task drained and exited between a
                    // leave and this join; start a fresh one.
                    let tx = spawn_room(room_code.clone());
                    let _ = tx.send(cmd).await;
                    self.rooms.insert(room_code, tx);
                }
            }
            HubCommand::Send { room_code, message } => {
                self.forward(&room_code, RoomCommand::Send { message }).await;
            }
            HubCommand::Leave {
                room_code,
                session_id,
                username,
            } => {
                self.forward(
                    &room_code,
                    RoomCommand::Leave {
                        session_id,
                        username,
                    },
                )
                .await;
            }
        }
    }

    /// Forward to an existing room task; a closed or missing room means the
    /// room is Empty and the command has nowhere to go.
    async fn forward(&mut self, room_code: &RoomCode, cmd: RoomCommand) {
        match self.rooms.get(room_code) {
            Some(tx) => {
                if tx.send(cmd).await.is_err() {
                    debug!(%room_code, "room drained; dropping stale handle");
                    self.rooms.remove(room_code);
                }
            }
            None => debug!(%room_code, "command for room with no sessions"),
        }
    }
}

fn spawn_room(code: RoomCode) -> mpsc::Sender<RoomCommand> {
    let (tx, rx) = mpsc::channel(ROOM_BUFFER);
    tokio::spawn(
        RoomActor {
            code,
            sessions: HashMap::new(),
            receiver: rx,
        }
        .run(),
    );
    tx
}

/// One task per active room; the only place its session set is touched.
struct RoomActor {
    code: RoomCode,
    sessions: HashMap<SessionId, mpsc::Sender<ChatMessage>>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        debug!(room = %self.code, "room active");
        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    session_id,
                    username,
                    sender,
                } => {
                    self.sessions.insert(session_id, sender);
                    info!(room = %self.code, %session_id, %username, "session joined");
                    self.broadcast(ChatMessage::join(&username));
                }
                RoomCommand::Send { message } => {
                    self.broadcast(message);
                }
                RoomCommand::Leave {
                    session_id,
                    username,
                } => {
                    if self.sessions.remove(&session_id).is_some() {
                        info!(room = %self.code, %session_id, %username, "session left");
                        self.broadcast(ChatMessage::leave(&username));
                    }
                    if self.sessions.is_empty() {
                        // Active -> Empty: the task ends with the room.
                        break;
                    }
                }
            }
        }
        debug!(room = %self.code, "room empty");
    }

    /// Deliver to every session, best effort. A full buffer loses this one
    /// message for that session; a closed channel removes the session.
    fn broadcast(&mut self, message: ChatMessage) {
        let room = &self.code;
        self.sessions.retain(|session_id, tx| {
            match tx.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(%room, %session_id, "session buffer full; dropping message");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%room, %session_id, "session channel closed; removing");
                    false
                }
            }
        });
    }
}
