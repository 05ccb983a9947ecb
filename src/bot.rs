//! Bots and the capability guard
//!
//! Users may attach automated bots to rooms they own. Capabilities come in
//! two fixed classes: three grantable ones a creator may switch off, and
//! five permanently denied ones that model a hard security boundary
//! (account search, data harvesting, offensive network use, host access).
//!
//! The denied class is enforced twice over:
//! - it is not representable in the request types, so no write path exists;
//! - [`authorize`] answers `false` for it from the capability
//!   classification alone, before looking at any stored field.
//!
//! The bots table persists the five denied columns as constant FALSE for
//! schema fidelity, but they are never selected back into [`Bot`].

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use tracing::info;

use crate::codegen;
use crate::error::AppError;
use crate::registry::Room;
use crate::store::Store;
use crate::types::{BotToken, Owned, UserId};

/// Everything a bot may ask to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Grantable
    MonitorRoom,
    CreateRoles,
    CreateModerators,
    // Permanently denied
    SearchUsers,
    FetchUserData,
    Ddos,
    ReverseConnect,
    AccessUserSystems,
}

impl Capability {
    pub const GRANTABLE: [Capability; 3] = [
        Capability::MonitorRoom,
        Capability::CreateRoles,
        Capability::CreateModerators,
    ];

    pub const DENIED: [Capability; 5] = [
        Capability::SearchUsers,
        Capability::FetchUserData,
        Capability::Ddos,
        Capability::ReverseConnect,
        Capability::AccessUserSystems,
    ];

    /// Whether this capability belongs to the permanently denied class.
    pub fn is_denied(self) -> bool {
        matches!(
            self,
            Capability::SearchUsers
                | Capability::FetchUserData
                | Capability::Ddos
                | Capability::ReverseConnect
                | Capability::AccessUserSystems
        )
    }
}

/// A persisted bot. Carries only the grantable capability flags; the denied
/// class has no representation here at all.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub bot_token: BotToken,
    pub owner_id: UserId,
    pub room_id: Option<i64>,
    pub is_active: bool,
    pub ai_model: Option<String>,
    pub personality: Option<String>,
    pub can_monitor_room: bool,
    pub can_create_roles: bool,
    pub can_create_moderators: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Owned for Bot {
    fn owner_id(&self) -> UserId {
        self.owner_id
    }
}

/// Answer whether `bot` holds `capability`.
///
/// Pure. The denied class short-circuits to `false` without reading the
/// bot, so no persisted value could ever flip it.
pub fn authorize(bot: &Bot, capability: Capability) -> bool {
    if capability.is_denied() {
        return false;
    }
    match capability {
        Capability::MonitorRoom => bot.can_monitor_room,
        Capability::CreateRoles => bot.can_create_roles,
        Capability::CreateModerators => bot.can_create_moderators,
        // is_denied() covered the rest
        _ => false,
    }
}

/// The full eight-flag matrix, rendered from [`authorize`] so the denied
/// flags can only ever read `false`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityMatrix {
    pub can_monitor_room: bool,
    pub can_create_roles: bool,
    pub can_create_moderators: bool,
    pub can_search_users: bool,
    pub can_fetch_user_data: bool,
    pub can_ddos: bool,
    pub can_reverse_connect: bool,
    pub can_access_user_systems: bool,
}

pub fn capability_matrix(bot: &Bot) -> CapabilityMatrix {
    CapabilityMatrix {
        can_monitor_room: authorize(bot, Capability::MonitorRoom),
        can_create_roles: authorize(bot, Capability::CreateRoles),
        can_create_moderators: authorize(bot, Capability::CreateModerators),
        can_search_users: authorize(bot, Capability::SearchUsers),
        can_fetch_user_data: authorize(bot, Capability::FetchUserData),
        can_ddos: authorize(bot, Capability::Ddos),
        can_reverse_connect: authorize(bot, Capability::ReverseConnect),
        can_access_user_systems: authorize(bot, Capability::AccessUserSystems),
    }
}

/// Creation request. Note there is no way to spell a denied capability
/// here; unknown JSON fields (e.g. `can_ddos`) are dropped by serde.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateBot {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub room_id: Option<i64>,
    #[serde(default)]
    pub can_monitor_room: Option<bool>,
    #[serde(default)]
    pub can_create_roles: Option<bool>,
    #[serde(default)]
    pub can_create_moderators: Option<bool>,
}

/// Partial update; capabilities are immutable after creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateBot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ai_model: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Columns selected into [`Bot`]; the denied columns stay in the table.
const BOT_COLUMNS: &str = "id, name, description, bot_token, owner_id, room_id, is_active, \
                           ai_model, personality, can_monitor_room, can_create_roles, \
                           can_create_moderators, created_at, updated_at";

/// Service owning bot CRUD and the capability boundary.
#[derive(Debug, Clone)]
pub struct BotCapabilityGuard {
    store: Store,
}

impl BotCapabilityGuard {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a bot for `owner`, optionally bound to a room they own.
    pub async fn create(&self, req: CreateBot, owner: UserId) -> Result<Bot, AppError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("bot name must not be empty".into()));
        }

        if let Some(room_id) = req.room_id {
            let room = sqlx::query_as::<_, Room>("SELECT * FROM rooms WHERE id = ?")
                .bind(room_id)
                .fetch_optional(self.store.pool())
                .await?
                .ok_or(AppError::NotFound("room"))?;
            room.require_owner(owner)?;
        }

        let can_monitor_room = req.can_monitor_room.unwrap_or(true);
        let can_create_roles = req.can_create_roles.unwrap_or(true);
        let can_create_moderators = req.can_create_moderators.unwrap_or(true);

        for _ in 0..codegen::MAX_ATTEMPTS {
            let token = codegen::generate_unique(
                || codegen::generate_token(codegen::TOKEN_LEN),
                |candidate| {
                    let store = self.store.clone();
                    async move {
                        let taken: Option<(i64,)> =
                            sqlx::query_as("SELECT 1 FROM bots WHERE bot_token = ?")
                                .bind(&candidate)
                                .fetch_optional(store.pool())
                                .await?;
                        Ok(taken.is_some())
                    }
                },
            )
            .await?;

            let now = OffsetDateTime::now_utc();
            let inserted = sqlx::query_as::<_, Bot>(&format!(
                "INSERT INTO bots \
                 (name, description, bot_token, owner_id, room_id, is_active, ai_model, personality, \
                  can_monitor_room, can_create_roles, can_create_moderators, \
                  can_search_users, can_fetch_user_data, can_ddos, can_reverse_connect, can_access_user_systems, \
                  created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, 0, 0, 0, 0, 0, ?, ?) \
                 RETURNING {BOT_COLUMNS}"
            ))
            .bind(&name)
            .bind(&req.description)
            .bind(&token)
            .bind(owner)
            .bind(req.room_id)
            .bind(&req.ai_model)
            .bind(&req.personality)
            .bind(can_monitor_room)
            .bind(can_create_roles)
            .bind(can_create_moderators)
            .bind(now)
            .bind(now)
            .fetch_one(self.store.pool())
            .await;

            match inserted.map_err(AppError::from) {
                Ok(bot) => {
                    info!(bot = %bot.name, %owner, "bot created");
                    return Ok(bot);
                }
                Err(AppError::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(AppError::CodeSpaceExhausted)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Bot, AppError> {
        sqlx::query_as::<_, Bot>(&format!("SELECT {BOT_COLUMNS} FROM bots WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.store.pool())
            .await?
            .ok_or(AppError::NotFound("bot"))
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Bot, AppError> {
        sqlx::query_as::<_, Bot>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE bot_token = ?"
        ))
        .bind(token)
        .fetch_optional(self.store.pool())
        .await?
        .ok_or(AppError::NotFound("bot"))
    }

    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<Bot>, AppError> {
        let bots = sqlx::query_as::<_, Bot>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE owner_id = ? ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(self.store.pool())
        .await?;
        Ok(bots)
    }

    /// Active bots attached to a room.
    pub async fn list_room_bots(&self, room_id: i64) -> Result<Vec<Bot>, AppError> {
        let bots = sqlx::query_as::<_, Bot>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE room_id = ? AND is_active = 1 ORDER BY id"
        ))
        .bind(room_id)
        .fetch_all(self.store.pool())
        .await?;
        Ok(bots)
    }

    /// Partial update, owner-gated. Capability flags are not updatable.
    pub async fn update(&self, id: i64, patch: UpdateBot, caller: UserId) -> Result<Bot, AppError> {
        let bot = self.get_by_id(id).await?;
        bot.require_owner(caller)?;

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AppError::Validation("bot name must not be empty".into()));
            }
        }

        let updated = sqlx::query_as::<_, Bot>(&format!(
            "UPDATE bots SET \
             name        = COALESCE(?, name), \
             description = COALESCE(?, description), \
             ai_model    = COALESCE(?, ai_model), \
             personality = COALESCE(?, personality), \
             is_active   = COALESCE(?, is_active), \
             updated_at  = ? \
             WHERE id = ? \
             RETURNING {BOT_COLUMNS}"
        ))
        .bind(patch.name.as_deref().map(str::trim))
        .bind(&patch.description)
        .bind(&patch.ai_model)
        .bind(&patch.personality)
        .bind(patch.is_active)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .fetch_one(self.store.pool())
        .await?;
        Ok(updated)
    }

    /// Hard delete, owner-gated.
    pub async fn delete(&self, id: i64, caller: UserId) -> Result<(), AppError> {
        let bot = self.get_by_id(id).await?;
        bot.require_owner(caller)?;

        sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(id)
            .execute(self.store.pool())
            .await?;
        info!(bot = %bot.name, "bot deleted");
        Ok(())
    }

    /// Generate the downloadable client script for a bot, owner-gated.
    ///
    /// The embedded capability flags are rendered from [`capability_matrix`],
    /// so they always match what [`authorize`] would answer.
    pub async fn client_script(&self, id: i64, caller: UserId) -> Result<String, AppError> {
        let bot = self.get_by_id(id).await?;
        bot.require_owner(caller)?;

        let room_code = match bot.room_id {
            Some(room_id) => {
                sqlx::query_as::<_, (String,)>("SELECT room_code FROM rooms WHERE id = ?")
                    .bind(room_id)
                    .fetch_optional(self.store.pool())
                    .await?
                    .map(|(code,)| code)
            }
            None => None,
        };

        Ok(render_client_script(&bot, room_code.as_deref()))
    }
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn render_client_script(bot: &Bot, room_code: Option<&str>) -> String {
    let matrix = capability_matrix(bot);
    format!(
        r#""""Chathub bot client - generated for your account.

[!] SECURITY NOTICE [!]
This file contains your personal bot token. Do not share it.
The capability restrictions below are hardcoded server-side; editing them
here changes nothing.
"""

BOT_TOKEN = '{token}'
BOT_NAME = '{name}'
ROOM_CODE = '{room}'

class Capabilities:
    # Grantable
    CAN_MONITOR_ROOM = {monitor}
    CAN_CREATE_ROLES = {roles}
    CAN_CREATE_MODERATORS = {moderators}

    # Permanently denied
    CAN_SEARCH_USERS = {search}
    CAN_FETCH_USER_DATA = {fetch}
    CAN_DDOS = {ddos}
    CAN_REVERSE_CONNECT = {reverse}
    CAN_ACCESS_USER_SYSTEMS = {systems}
"#,
        token = bot.bot_token.as_str(),
        name = bot.name,
        room = room_code.unwrap_or("Not assigned"),
        monitor = py_bool(matrix.can_monitor_room),
        roles = py_bool(matrix.can_create_roles),
        moderators = py_bool(matrix.can_create_moderators),
        search = py_bool(matrix.can_search_users),
        fetch = py_bool(matrix.can_fetch_user_data),
        ddos = py_bool(matrix.can_ddos),
        reverse = py_bool(matrix.can_reverse_connect),
        systems = py_bool(matrix.can_access_user_systems),
    )
}
