//! Basic type definitions for the chat service
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`: numeric account identifier (matches the persisted owner columns)
//! - `SessionId`: UUID-based live-connection identifier
//! - `RoomCode`: short public room identifier
//! - `BotToken`: secret bot credential
//!
//! Also hosts the [`Owned`] trait, the single place where "only the creator
//! may mutate this" is enforced for rooms and bots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Numeric user identifier.
///
/// The account subsystem is external to this crate; callers hand us an
/// already-authenticated id and we only ever compare it against owner
/// columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique live-session identifier (newtype pattern)
///
/// Wraps a UUID v4. A session belongs to exactly one room for its lifetime;
/// rejoining requires a new session and therefore a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public room code (uppercase alphanumeric)
///
/// Issued exactly once at room creation and immutable afterwards. Inbound
/// codes are normalized to uppercase so clients may type them either way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    /// Create a RoomCode from a string (converts to uppercase)
    pub fn from_string(code: String) -> Self {
        Self(code.to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secret bot credential (32-character mixed-case alphanumeric).
///
/// Returned once at creation; treat as a secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct BotToken(pub String);

impl BotToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A resource with a single owning user.
///
/// Rooms and bots are exclusively owned by their creator; every mutating
/// operation goes through [`Owned::require_owner`] instead of repeating the
/// identity comparison per entity type.
pub trait Owned {
    fn owner_id(&self) -> UserId;

    /// Fail with `Unauthorized` unless `caller` is the owner.
    ///
    /// The error deliberately carries no resource detail beyond the denial.
    fn require_owner(&self, caller: UserId) -> Result<(), AppError> {
        if self.owner_id() == caller {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget {
        owner: UserId,
    }

    impl Owned for Widget {
        fn owner_id(&self) -> UserId {
            self.owner
        }
    }

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_code_uppercase() {
        let code = RoomCode::from_string("abc123xy".to_string());
        assert_eq!(code.0, "ABC123XY");
    }

    #[test]
    fn test_require_owner_accepts_owner() {
        let w = Widget { owner: UserId(7) };
        assert!(w.require_owner(UserId(7)).is_ok());
    }

    #[test]
    fn test_require_owner_rejects_other() {
        let w = Widget { owner: UserId(7) };
        assert!(matches!(
            w.require_owner(UserId(8)),
            Err(AppError::Unauthorized)
        ));
    }
}
