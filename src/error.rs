//! Error types for the chat service
//!
//! One taxonomy for the whole crate: domain errors surfaced to callers
//! (validation, not-found, ownership, conflicts) and transport/store errors
//! that end a connection or bubble up from sqlx. Uses thiserror for
//! ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input, rejected before any side effect
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown id or code; the 404-equivalent
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Caller is not the owner of the resource
    ///
    /// Intentionally generic: leaks nothing about the resource beyond the
    /// denial itself.
    #[error("not authorized")]
    Unauthorized,

    /// Store-level unique-constraint violation (room code, bot token,
    /// server name). Callers retry generation transparently.
    #[error("conflict on unique value")]
    Conflict,

    /// Bounded retry of code/token generation was exhausted
    #[error("code space exhausted after bounded retries")]
    CodeSpaceExhausted,

    /// Any other database error
    #[error("store error: {0}")]
    Store(#[source] sqlx::Error),

    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal channel broken (actor gone)
    #[error("channel send error")]
    ChannelSend,
}

/// Classify sqlx errors: unique-constraint violations become [`AppError::Conflict`]
/// so services can retry with a fresh code; everything else is a store error.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::Conflict,
            other => AppError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_message_is_generic() {
        let msg = AppError::Unauthorized.to_string();
        assert_eq!(msg, "not authorized");
    }

    #[test]
    fn test_not_found_names_the_kind() {
        assert_eq!(AppError::NotFound("room").to_string(), "room not found");
    }
}
