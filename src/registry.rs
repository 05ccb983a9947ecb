//! Room model and registry
//!
//! Owns Room rows: creation with a freshly allocated unique code, lookup by
//! code, partial updates and deletion. Mutations are owner-gated through
//! [`Owned::require_owner`]. Code uniqueness is ultimately enforced by the
//! `room_code` UNIQUE constraint; the generator's existence pre-check only
//! shortens the conflict window.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::info;

use crate::codegen;
use crate::config::Config;
use crate::error::AppError;
use crate::store::Store;
use crate::types::{Owned, RoomCode, UserId};

/// Room names are capped at this many characters.
const MAX_NAME_LEN: usize = 100;

/// Default room capacity when the creator does not pick one.
const DEFAULT_MAX_MEMBERS: i64 = 50;

/// A persisted chat room.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub room_code: RoomCode,
    pub room_url: String,
    pub max_members: i64,
    pub allow_bots: bool,
    pub is_active: bool,
    pub owner_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Owned for Room {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// Fields a creator supplies for a new room.
#[derive(Debug, Clone, Default)]
pub struct CreateRoom {
    pub name: String,
    pub description: Option<String>,
    pub max_members: Option<i64>,
    pub allow_bots: Option<bool>,
}

/// Partial update; only provided fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct UpdateRoom {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_members: Option<i64>,
    pub allow_bots: Option<bool>,
    pub is_active: Option<bool>,
}

/// Service owning room CRUD and code allocation.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    store: Store,
    base_url: String,
    code_len: usize,
}

impl RoomRegistry {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            base_url: config.room_base_url.trim_end_matches('/').to_string(),
            code_len: config.room_code_len,
        }
    }

    /// Create a room for `owner`, allocating a unique code.
    ///
    /// A room is either fully created with a unique code or not created at
    /// all: a late UNIQUE conflict on insert throws the candidate away and
    /// retries with a fresh one, bounded like the generator itself.
    pub async fn create(&self, req: CreateRoom, owner: UserId) -> Result<Room, AppError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("room name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::Validation(format!(
                "room name longer than {MAX_NAME_LEN} characters"
            )));
        }
        let max_members = req.max_members.unwrap_or(DEFAULT_MAX_MEMBERS);
        if max_members <= 0 {
            return Err(AppError::Validation("max_members must be positive".into()));
        }
        let allow_bots = req.allow_bots.unwrap_or(true);

        for _ in 0..codegen::MAX_ATTEMPTS {
            let code = codegen::generate_unique(
                || codegen::generate(self.code_len),
                |candidate| {
                    let store = self.store.clone();
                    async move {
                        let taken: Option<(i64,)> =
                            sqlx::query_as("SELECT 1 FROM rooms WHERE room_code = ?")
                                .bind(&candidate)
                                .fetch_optional(store.pool())
                                .await?;
                        Ok(taken.is_some())
                    }
                },
            )
            .await?;

            let now = OffsetDateTime::now_utc();
            let room_url = format!("{}/{}", self.base_url, code);
            let inserted = sqlx::query_as::<_, Room>(
                "INSERT INTO rooms \
                 (name, description, room_code, room_url, max_members, allow_bots, is_active, owner_id, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?) \
                 RETURNING *",
            )
            .bind(&name)
            .bind(&req.description)
            .bind(&code)
            .bind(&room_url)
            .bind(max_members)
            .bind(allow_bots)
            .bind(owner)
            .bind(now)
            .bind(now)
            .fetch_one(self.store.pool())
            .await;

            match inserted.map_err(AppError::from) {
                Ok(room) => {
                    info!(room_code = %room.room_code, %owner, "room created");
                    return Ok(room);
                }
                // Lost the race against a concurrent creation; new code.
                Err(AppError::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AppError::CodeSpaceExhausted)
    }

    pub async fn get_by_code(&self, code: &RoomCode) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE room_code = ?")
            .bind(code)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(AppError::NotFound("room"))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Room, AppError> {
        sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(AppError::NotFound("room"))
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Room>, AppError> {
        let rooms = sqlx::query_as::<_, Room>(
            "SELECT * FROM rooms WHERE owner_id = ? ORDER BY id",
        )
        .bind(owner)
        .fetch_all(self.store.pool())
        .await?;
        Ok(rooms)
    }

    /// Partial update, owner-gated. Only provided fields overwrite.
    pub async fn update(
        &self,
        id: i64,
        patch: UpdateRoom,
        caller: UserId,
    ) -> Result<Room, AppError> {
        let room = self.get_by_id(id).await?;
        room.require_owner(caller)?;

        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("room name must not be empty".into()));
            }
            if name.chars().count() > MAX_NAME_LEN {
                return Err(AppError::Validation(format!(
                    "room name longer than {MAX_NAME_LEN} characters"
                )));
            }
        }

        let updated = sqlx::query_as::<_, Room>(
            "UPDATE rooms SET \
             name        = COALESCE(?, name), \
             description = COALESCE(?, description), \
             max_members = COALESCE(?, max_members), \
             allow_bots  = COALESCE(?, allow_bots), \
             is_active   = COALESCE(?, is_active), \
             updated_at  = ? \
             WHERE id = ? \
             RETURNING *",
        )
        .bind(patch.name.as_deref().map(str::trim))
        .bind(&patch.description)
        .bind(patch.max_members)
        .bind(patch.allow_bots)
        .bind(patch.is_active)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .fetch_one(self.store.pool())
        .await?;
        Ok(updated)
    }

    /// Hard delete, owner-gated.
    pub async fn delete(&self, id: i64, caller: UserId) -> Result<(), AppError> {
        let room = self.get_by_id(id).await?;
        room.require_owner(caller)?;

        sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(id)
            .execute(self.store.pool())
            .await?;
        info!(room_code = %room.room_code, "room deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn registry() -> RoomRegistry {
        RoomRegistry::new(Store::in_memory().await.unwrap(), &Config::default())
    }

    fn named(name: &str) -> CreateRoom {
        CreateRoom {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_study_group_with_defaults() {
        let registry = registry().await;
        let room = registry.create(named("Study Group"), UserId(1)).await.unwrap();

        assert_eq!(room.name, "Study Group");
        assert_eq!(room.max_members, 50);
        assert!(room.allow_bots);
        assert!(room.is_active);
        let code = room.room_code.as_str();
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        assert!(room.room_url.ends_with(code));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_name() {
        let registry = registry().await;
        let err = registry.create(named("   "), UserId(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_name() {
        let registry = registry().await;
        let err = registry
            .create(named(&"x".repeat(101)), UserId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_by_code_unknown_is_not_found() {
        let registry = registry().await;
        let err = registry
            .get_by_code(&RoomCode::from_string("NOSUCH00".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound("room")));
    }

    #[tokio::test]
    async fn test_get_by_code_accepts_lowercase_input() {
        let registry = registry().await;
        let room = registry.create(named("Lounge"), UserId(1)).await.unwrap();
        let lowercase = room.room_code.as_str().to_lowercase();
        let found = registry
            .get_by_code(&RoomCode::from_string(lowercase))
            .await
            .unwrap();
        assert_eq!(found.id, room.id);
    }

    #[tokio::test]
    async fn test_update_overwrites_only_provided_fields() {
        let registry = registry().await;
        let room = registry
            .create(
                CreateRoom {
                    name: "Old".into(),
                    description: Some("keep me".into()),
                    ..Default::default()
                },
                UserId(1),
            )
            .await
            .unwrap();

        let updated = registry
            .update(
                room.id,
                UpdateRoom {
                    name: Some("New".into()),
                    ..Default::default()
                },
                UserId(1),
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "New");
        assert_eq!(updated.description.as_deref(), Some("keep me"));
        assert_eq!(updated.room_code, room.room_code);
    }

    #[tokio::test]
    async fn test_update_by_non_owner_is_unauthorized() {
        let registry = registry().await;
        let room = registry.create(named("Mine"), UserId(1)).await.unwrap();
        let err = registry
            .update(
                room.id,
                UpdateRoom {
                    name: Some("Stolen".into()),
                    ..Default::default()
                },
                UserId(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[tokio::test]
    async fn test_delete_by_non_owner_leaves_room_unchanged() {
        let registry = registry().await;
        let room = registry.create(named("Mine"), UserId(1)).await.unwrap();

        let err = registry.delete(room.id, UserId(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));

        let still_there = registry.get_by_code(&room.room_code).await.unwrap();
        assert_eq!(still_there.name, "Mine");
    }

    #[tokio::test]
    async fn test_delete_by_owner_removes_room() {
        let registry = registry().await;
        let room = registry.create(named("Gone soon"), UserId(1)).await.unwrap();
        registry.delete(room.id, UserId(1)).await.unwrap();
        assert!(matches!(
            registry.get_by_code(&room.room_code).await,
            Err(AppError::NotFound("room"))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_distinct_codes() {
        let registry = registry().await;
        let mut handles = Vec::new();
        for i in 0..8i64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry
                    .create(named(&format!("Room {i}")), UserId(i))
                    .await
                    .unwrap()
                    .room_code
            }));
        }
        let mut codes = HashSet::new();
        for handle in handles {
            codes.insert(handle.await.unwrap());
        }
        assert_eq!(codes.len(), 8);
    }
}
