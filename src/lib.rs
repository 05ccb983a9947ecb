//! Group-chat service core
//!
//! Rooms with short shareable codes, a fixed fleet of pre-made shared
//! servers with least-loaded placement, real-time per-room message fan-out,
//! and capability-restricted bots.
//!
//! # Architecture
//! Live-session state is actor-owned, no locks:
//! - [`hub::SessionHub`] is a manager actor; each active room runs its own
//!   task, which is the single point of serialization for that room
//! - each connection has a [`handler`] task talking to the hub over `mpsc`
//! - durable state (rooms, servers, bots) lives in SQLite behind
//!   [`store::Store`]; its UNIQUE constraints are the authority on code and
//!   token uniqueness
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chathub::{Config, RoomRegistry, ServerPool, SessionHub, Store, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env();
//!     let store = Store::connect(&config.database_url).await.unwrap();
//!     store.migrate().await.unwrap();
//!     ServerPool::new(store.clone()).ensure_seeded().await.unwrap();
//!
//!     let registry = RoomRegistry::new(store, &config);
//!     let hub = SessionHub::spawn();
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, registry.clone(), hub.clone()));
//!     }
//! }
//! ```

pub mod bot;
pub mod codegen;
pub mod config;
pub mod error;
pub mod handler;
pub mod hub;
pub mod message;
pub mod pool;
pub mod registry;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use bot::{authorize, Bot, BotCapabilityGuard, Capability, CapabilityMatrix};
pub use config::Config;
pub use error::AppError;
pub use handler::handle_connection;
pub use hub::SessionHub;
pub use message::{ChatMessage, InboundEvent, MessageType};
pub use pool::{AssignUser, PreMadeServer, ServerPool, ServerType};
pub use registry::{CreateRoom, Room, RoomRegistry, UpdateRoom};
pub use store::Store;
pub use types::{BotToken, Owned, RoomCode, SessionId, UserId};
