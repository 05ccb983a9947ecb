//! Runtime configuration
//!
//! Read once from the environment at startup. Every knob has a default so
//! `cargo run` works out of the box; see the constants for the env names.

use std::env;

/// Bind address for the WebSocket listener.
pub const ENV_ADDR: &str = "CHATHUB_ADDR";
/// sqlx database URL.
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Base URL that room codes are appended to when deriving `room_url`.
pub const ENV_ROOM_BASE_URL: &str = "CHATHUB_ROOM_BASE_URL";
/// Length of generated room codes.
pub const ENV_ROOM_CODE_LEN: &str = "CHATHUB_ROOM_CODE_LEN";

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_DATABASE_URL: &str = "sqlite://chathub.db";
const DEFAULT_ROOM_BASE_URL: &str = "http://localhost:8080/room";
const DEFAULT_ROOM_CODE_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub room_base_url: String,
    pub room_code_len: usize,
}

impl Config {
    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// A non-numeric `CHATHUB_ROOM_CODE_LEN` falls back to the default
    /// rather than aborting startup.
    pub fn from_env() -> Self {
        let room_code_len = env::var(ENV_ROOM_CODE_LEN)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_ROOM_CODE_LEN);

        Self {
            bind_addr: env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string()),
            database_url: env::var(ENV_DATABASE_URL)
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            room_base_url: env::var(ENV_ROOM_BASE_URL)
                .unwrap_or_else(|_| DEFAULT_ROOM_BASE_URL.to_string()),
            room_code_len,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            room_base_url: DEFAULT_ROOM_BASE_URL.to_string(),
            room_code_len: DEFAULT_ROOM_CODE_LEN,
        }
    }
}
