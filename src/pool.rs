//! Pre-made shared servers and least-loaded assignment
//!
//! A fixed fleet of shared rooms is provisioned once at process start; new
//! verified users are placed on the least-loaded active server. Member
//! counters are only ever touched through single SQL statements, so the
//! read-then-increment in [`ServerPool::assign`] cannot race another
//! assignment past a server's capacity.

use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::error::AppError;
use crate::store::Store;
use crate::types::UserId;

/// Theme of a pre-made server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerType {
    Gaming,
    Study,
    Work,
    Social,
    General,
}

/// A shared pre-provisioned server with a live member counter.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PreMadeServer {
    pub id: i64,
    pub server_name: String,
    pub description: Option<String>,
    pub server_type: ServerType,
    pub max_members: i64,
    pub current_members: i64,
    pub is_active: bool,
    pub auto_assign: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The slice of a user account that placement needs.
///
/// Accounts live outside this crate; only verified users are placed.
#[derive(Debug, Clone, Copy)]
pub struct AssignUser {
    pub id: UserId,
    pub verified: bool,
}

/// The fleet provisioned by [`ServerPool::ensure_seeded`].
const SEED_CATALOG: [(&str, &str, ServerType, i64); 5] = [
    (
        "Gaming Central",
        "The ultimate gaming community for all gamers",
        ServerType::Gaming,
        5000,
    ),
    (
        "Study Hub",
        "Collaborative learning space for students and learners",
        ServerType::Study,
        2000,
    ),
    (
        "Workspace",
        "Professional collaboration and networking",
        ServerType::Work,
        1000,
    ),
    (
        "Social Hub",
        "Social gatherings, events, and casual conversations",
        ServerType::Social,
        3000,
    ),
    (
        "General Chat",
        "General discussions for all topics and interests",
        ServerType::General,
        10000,
    ),
];

/// Service owning the shared-server fleet.
#[derive(Debug, Clone)]
pub struct ServerPool {
    store: Store,
}

impl ServerPool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// One-time fleet provisioning. No-op if any pre-made server exists.
    pub async fn ensure_seeded(&self) -> Result<(), AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pre_made_servers")
            .fetch_one(self.store.pool())
            .await?;
        if count > 0 {
            return Ok(());
        }

        let now = OffsetDateTime::now_utc();
        for (name, description, server_type, max_members) in SEED_CATALOG {
            sqlx::query(
                "INSERT INTO pre_made_servers \
                 (server_name, description, server_type, max_members, current_members, is_active, auto_assign, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, 0, 1, 1, ?, ?)",
            )
            .bind(name)
            .bind(description)
            .bind(server_type)
            .bind(max_members)
            .bind(now)
            .bind(now)
            .execute(self.store.pool())
            .await?;
        }
        info!("seeded {} pre-made servers", SEED_CATALOG.len());
        Ok(())
    }

    /// Place a verified user on the least-loaded active server.
    ///
    /// One atomic statement: the subselect picks the active server with the
    /// minimum member count (ties by insertion order) and the outer guard
    /// claims a seat only if it still has room. If the least-loaded server
    /// is full, no other server is tried; that narrow policy is kept from
    /// the fleet design on purpose. Returns `None` for unverified users and
    /// when no seat was claimed.
    pub async fn assign(&self, user: &AssignUser) -> Result<Option<PreMadeServer>, AppError> {
        if !user.verified {
            return Ok(None);
        }

        let assigned = sqlx::query_as::<_, PreMadeServer>(
            "UPDATE pre_made_servers \
             SET current_members = current_members + 1, updated_at = ? \
             WHERE id = (SELECT id FROM pre_made_servers \
                         WHERE is_active = 1 \
                         ORDER BY current_members ASC, id ASC \
                         LIMIT 1) \
               AND current_members < max_members \
             RETURNING *",
        )
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(self.store.pool())
        .await?;

        match &assigned {
            Some(server) => info!(
                user = %user.id,
                server = %server.server_name,
                members = server.current_members,
                "assigned user to pre-made server"
            ),
            None => warn!(user = %user.id, "no server available for assignment"),
        }
        Ok(assigned)
    }

    /// Adjust a server's member counter by `delta`, floored at zero.
    /// Used symmetrically on join (+1) and leave (-1).
    pub async fn adjust_membership(&self, server_name: &str, delta: i64) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE pre_made_servers \
             SET current_members = MAX(0, current_members + ?), updated_at = ? \
             WHERE server_name = ?",
        )
        .bind(delta)
        .bind(OffsetDateTime::now_utc())
        .bind(server_name)
        .execute(self.store.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("server"));
        }
        Ok(())
    }

    /// All active servers, with live member counts.
    pub async fn list_active(&self) -> Result<Vec<PreMadeServer>, AppError> {
        let servers = sqlx::query_as::<_, PreMadeServer>(
            "SELECT * FROM pre_made_servers WHERE is_active = 1 ORDER BY id",
        )
        .fetch_all(self.store.pool())
        .await?;
        Ok(servers)
    }

    pub async fn get_by_name(&self, server_name: &str) -> Result<PreMadeServer, AppError> {
        sqlx::query_as::<_, PreMadeServer>(
            "SELECT * FROM pre_made_servers WHERE server_name = ?",
        )
        .bind(server_name)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or(AppError::NotFound("server"))
    }

    /// Every server including inactive ones, for the admin surface.
    pub async fn statistics(&self) -> Result<Vec<PreMadeServer>, AppError> {
        let servers =
            sqlx::query_as::<_, PreMadeServer>("SELECT * FROM pre_made_servers ORDER BY id")
                .fetch_all(self.store.pool())
                .await?;
        Ok(servers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_pool() -> ServerPool {
        let pool = ServerPool::new(Store::in_memory().await.unwrap());
        pool.ensure_seeded().await.unwrap();
        pool
    }

    fn verified(id: i64) -> AssignUser {
        AssignUser {
            id: UserId(id),
            verified: true,
        }
    }

    async fn set_members(pool: &ServerPool, name: &str, members: i64) {
        sqlx::query("UPDATE pre_made_servers SET current_members = ? WHERE server_name = ?")
            .bind(members)
            .bind(name)
            .execute(pool.store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let pool = seeded_pool().await;
        pool.ensure_seeded().await.unwrap();
        assert_eq!(pool.statistics().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_unverified_user_is_not_assigned() {
        let pool = seeded_pool().await;
        let user = AssignUser {
            id: UserId(1),
            verified: false,
        };
        assert!(pool.assign(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_assign_picks_least_loaded_active_server() {
        let pool = ServerPool::new(Store::in_memory().await.unwrap());
        pool.ensure_seeded().await.unwrap();
        // Deactivate all but two, load them 3 and 7.
        sqlx::query("UPDATE pre_made_servers SET is_active = 0")
            .execute(pool.store.pool())
            .await
            .unwrap();
        sqlx::query(
            "UPDATE pre_made_servers SET is_active = 1 WHERE server_name IN ('Study Hub', 'Workspace')",
        )
        .execute(pool.store.pool())
        .await
        .unwrap();
        set_members(&pool, "Study Hub", 7).await;
        set_members(&pool, "Workspace", 3).await;

        let server = pool.assign(&verified(1)).await.unwrap().unwrap();
        assert_eq!(server.server_name, "Workspace");
        assert_eq!(server.current_members, 4);
    }

    #[tokio::test]
    async fn test_assign_never_exceeds_capacity() {
        let pool = seeded_pool().await;
        // Fill every server to the brim.
        sqlx::query("UPDATE pre_made_servers SET current_members = max_members")
            .execute(pool.store.pool())
            .await
            .unwrap();

        assert!(pool.assign(&verified(1)).await.unwrap().is_none());
        for server in pool.statistics().await.unwrap() {
            assert!(server.current_members <= server.max_members);
        }
    }

    #[tokio::test]
    async fn test_full_least_loaded_server_means_no_assignment() {
        let pool = seeded_pool().await;
        // Workspace (cap 1000) saturated but with the lowest count relative
        // to the rest; the policy does not fall back to roomier servers.
        sqlx::query("UPDATE pre_made_servers SET current_members = 999, max_members = 999 WHERE server_name = 'Workspace'")
            .execute(pool.store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE pre_made_servers SET current_members = 1500 WHERE server_name != 'Workspace'")
            .execute(pool.store.pool())
            .await
            .unwrap();

        assert!(pool.assign(&verified(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sequential_assignments_balance_load() {
        let pool = seeded_pool().await;
        for i in 0..5i64 {
            assert!(pool.assign(&verified(i)).await.unwrap().is_some());
        }
        // Five assignments across a fresh five-server fleet land one each.
        for server in pool.statistics().await.unwrap() {
            assert_eq!(server.current_members, 1);
        }
    }

    #[tokio::test]
    async fn test_adjust_membership_floors_at_zero() {
        let pool = seeded_pool().await;
        pool.adjust_membership("Study Hub", -5).await.unwrap();
        let server = pool.get_by_name("Study Hub").await.unwrap();
        assert_eq!(server.current_members, 0);

        pool.adjust_membership("Study Hub", 1).await.unwrap();
        assert_eq!(
            pool.get_by_name("Study Hub").await.unwrap().current_members,
            1
        );
    }

    #[tokio::test]
    async fn test_adjust_membership_unknown_server() {
        let pool = seeded_pool().await;
        assert!(matches!(
            pool.adjust_membership("Nowhere", 1).await,
            Err(AppError::NotFound("server"))
        ));
    }
}
