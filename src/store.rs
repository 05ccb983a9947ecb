//! SQLite persistence layer
//!
//! A thin wrapper over an sqlx pool. The schema's UNIQUE constraints on
//! `room_code`, `bot_token` and `server_name` are the authority on
//! uniqueness; in-process existence checks elsewhere are only an
//! optimization. Schema bootstrap is idempotent (`CREATE TABLE IF NOT
//! EXISTS`), so every start runs it.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::error::AppError;

const MAX_CONNECTIONS: u32 = 16;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS rooms (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT    NOT NULL,
    description     TEXT,
    room_code       TEXT    NOT NULL UNIQUE,
    room_url        TEXT    NOT NULL,
    max_members     INTEGER NOT NULL DEFAULT 50,
    allow_bots      INTEGER NOT NULL DEFAULT 1,
    is_active       INTEGER NOT NULL DEFAULT 1,
    owner_id        INTEGER NOT NULL,
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS pre_made_servers (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    server_name     TEXT    NOT NULL UNIQUE,
    description     TEXT,
    server_type     TEXT    NOT NULL,
    max_members     INTEGER NOT NULL,
    current_members INTEGER NOT NULL DEFAULT 0,
    is_active       INTEGER NOT NULL DEFAULT 1,
    auto_assign     INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS bots (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    name                    TEXT    NOT NULL,
    description             TEXT,
    bot_token               TEXT    NOT NULL UNIQUE,
    owner_id                INTEGER NOT NULL,
    room_id                 INTEGER,
    is_active               INTEGER NOT NULL DEFAULT 1,
    ai_model                TEXT,
    personality             TEXT,
    can_monitor_room        INTEGER NOT NULL DEFAULT 1,
    can_create_roles        INTEGER NOT NULL DEFAULT 1,
    can_create_moderators   INTEGER NOT NULL DEFAULT 1,
    can_search_users        INTEGER NOT NULL DEFAULT 0,
    can_fetch_user_data     INTEGER NOT NULL DEFAULT 0,
    can_ddos                INTEGER NOT NULL DEFAULT 0,
    can_reverse_connect     INTEGER NOT NULL DEFAULT 0,
    can_access_user_systems INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT    NOT NULL,
    updated_at              TEXT    NOT NULL
);
"#;

/// Shared handle to the database. Cheap to clone (pool is reference-counted).
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (and create, if missing) the database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(AppError::Store)?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// In-memory store, already migrated. Used by tests.
    ///
    /// A single connection, because each `:memory:` connection is its own
    /// database.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_room_code_unique_constraint_is_authoritative() {
        let store = Store::in_memory().await.unwrap();
        let insert = "INSERT INTO rooms (name, room_code, room_url, owner_id, created_at, updated_at) \
                      VALUES ('a', 'SAMECODE', 'u', 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')";
        sqlx::query(insert).execute(store.pool()).await.unwrap();
        let err: AppError = sqlx::query(insert)
            .execute(store.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::Conflict));
    }
}
