// SQLite-backed moderation store.
//
// Tables:
// - moderation_config: one JSON document per guild
// - flagged_events: detection audit records and their review status
// - moderation_cases: per-guild numbered cases, UNIQUE(guild_id, case_number)
//
// Timestamps are RFC 3339 text. Evidence and applied actions are JSON.

use crate::core::moderation::{
    CaseRepository, CaseType, ConfigRepository, Evidence, FlaggedEvent, FlaggedEventRepository,
    FlaggedEventStatus, GuildModerationConfig, ModerationAction, ModerationCase, NewCase,
    NewFlaggedEvent, RuleType, Severity, StatusUpdate, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteModerationStore {
    pool: Pool<Sqlite>,
}

fn storage(e: impl ToString) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(storage)
}

fn parse_opt_time(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(parse_time).transpose()
}

fn opt_id(raw: Option<i64>) -> Option<u64> {
    raw.map(|id| id as u64)
}

/// Unique violations and lock timeouts mean another writer got there first.
fn classify_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() || db.message().contains("database is locked") {
            return StoreError::Conflict;
        }
    }
    storage(e)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl SqliteModerationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_config (
                guild_id INTEGER PRIMARY KEY,
                config_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flagged_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                channel_id INTEGER,
                message_id INTEGER,
                rule_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                description TEXT NOT NULL,
                evidence_json TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                action_taken_json TEXT,
                reviewed_by_user_id INTEGER,
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                auto_action_applied BOOLEAN NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_flagged_events_guild_status
                ON flagged_events(guild_id, status, created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_cases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                case_number INTEGER NOT NULL,
                target_user_id INTEGER NOT NULL,
                moderator_user_id INTEGER NOT NULL,
                case_type TEXT NOT NULL,
                reason TEXT,
                duration_secs INTEGER,
                created_at TEXT NOT NULL,
                expires_at TEXT,
                related_flagged_event_id INTEGER,
                reason_updated_by INTEGER,
                reason_updated_at TEXT,
                UNIQUE (guild_id, case_number)
            );
            CREATE INDEX IF NOT EXISTS idx_moderation_cases_target
                ON moderation_cases(guild_id, target_user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        Ok(())
    }

    fn row_to_flagged_event(row: &SqliteRow) -> Result<FlaggedEvent, StoreError> {
        let rule_type: String = row.get("rule_type");
        let severity: String = row.get("severity");
        let status: String = row.get("status");
        let evidence: String = row.get("evidence_json");
        let action_taken: Option<String> = row.get("action_taken_json");
        let created_at: String = row.get("created_at");

        Ok(FlaggedEvent {
            id: row.get::<i64, _>("id") as u64,
            guild_id: row.get::<i64, _>("guild_id") as u64,
            user_id: row.get::<i64, _>("user_id") as u64,
            channel_id: opt_id(row.get("channel_id")),
            message_id: opt_id(row.get("message_id")),
            rule_type: rule_type.parse::<RuleType>().map_err(storage)?,
            severity: severity.parse::<Severity>().map_err(storage)?,
            description: row.get("description"),
            evidence: serde_json::from_str::<Evidence>(&evidence).map_err(storage)?,
            status: status.parse::<FlaggedEventStatus>().map_err(storage)?,
            action_taken: action_taken
                .map(|json| serde_json::from_str::<ModerationAction>(&json))
                .transpose()
                .map_err(storage)?,
            reviewed_by_user_id: opt_id(row.get("reviewed_by_user_id")),
            created_at: parse_time(&created_at)?,
            reviewed_at: parse_opt_time(row.get("reviewed_at"))?,
            auto_action_applied: row.get("auto_action_applied"),
        })
    }

    fn row_to_case(row: &SqliteRow) -> Result<ModerationCase, StoreError> {
        let case_type: String = row.get("case_type");
        let created_at: String = row.get("created_at");

        Ok(ModerationCase {
            id: row.get::<i64, _>("id") as u64,
            case_number: row.get::<i64, _>("case_number") as u64,
            guild_id: row.get::<i64, _>("guild_id") as u64,
            target_user_id: row.get::<i64, _>("target_user_id") as u64,
            moderator_user_id: row.get::<i64, _>("moderator_user_id") as u64,
            case_type: case_type.parse::<CaseType>().map_err(storage)?,
            reason: row.get("reason"),
            duration_secs: row.get::<Option<i64>, _>("duration_secs").map(|s| s as u64),
            created_at: parse_time(&created_at)?,
            expires_at: parse_opt_time(row.get("expires_at"))?,
            related_flagged_event_id: opt_id(row.get("related_flagged_event_id")),
            reason_updated_by: opt_id(row.get("reason_updated_by")),
            reason_updated_at: parse_opt_time(row.get("reason_updated_at"))?,
        })
    }
}

#[async_trait]
impl ConfigRepository for SqliteModerationStore {
    async fn get_config(&self, guild_id: u64) -> Result<Option<GuildModerationConfig>, StoreError> {
        let row = sqlx::query("SELECT config_json FROM moderation_config WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(row) => {
                let json: String = row.get("config_json");
                Ok(Some(serde_json::from_str(&json).map_err(storage)?))
            }
            None => Ok(None),
        }
    }

    async fn save_config(&self, config: &GuildModerationConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string(config).map_err(storage)?;
        sqlx::query(
            r#"
            INSERT INTO moderation_config (guild_id, config_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(config.guild_id as i64)
        .bind(json)
        .bind(config.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

#[async_trait]
impl FlaggedEventRepository for SqliteModerationStore {
    async fn insert_flagged_event(
        &self,
        event: NewFlaggedEvent,
    ) -> Result<FlaggedEvent, StoreError> {
        let evidence = serde_json::to_string(&event.evidence).map_err(storage)?;
        let row = sqlx::query(
            r#"
            INSERT INTO flagged_events
                (guild_id, user_id, channel_id, message_id, rule_type, severity,
                 description, evidence_json, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            RETURNING *
            "#,
        )
        .bind(event.guild_id as i64)
        .bind(event.user_id as i64)
        .bind(event.channel_id.map(|id| id as i64))
        .bind(event.message_id.map(|id| id as i64))
        .bind(event.rule_type.as_str())
        .bind(event.severity.as_str())
        .bind(&event.description)
        .bind(evidence)
        .bind(event.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;

        Self::row_to_flagged_event(&row)
    }

    async fn get_flagged_event(&self, id: u64) -> Result<Option<FlaggedEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM flagged_events WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(Self::row_to_flagged_event).transpose()
    }

    async fn update_flagged_event_status(
        &self,
        id: u64,
        expected: FlaggedEventStatus,
        update: StatusUpdate,
    ) -> Result<FlaggedEvent, StoreError> {
        let action_taken = update
            .action_taken
            .map(|a| serde_json::to_string(&a))
            .transpose()
            .map_err(storage)?;

        let row = sqlx::query(
            r#"
            UPDATE flagged_events
            SET status = ?, action_taken_json = ?, reviewed_by_user_id = ?, reviewed_at = ?
            WHERE id = ? AND status = ?
            RETURNING *
            "#,
        )
        .bind(update.status.as_str())
        .bind(action_taken)
        .bind(update.reviewed_by_user_id.map(|id| id as i64))
        .bind(update.reviewed_at.to_rfc3339())
        .bind(id as i64)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => Self::row_to_flagged_event(&row),
            // Nothing matched: either the id is unknown or the status moved.
            None => match self.get_flagged_event(id).await? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::NotFound),
            },
        }
    }

    async fn try_claim_auto_action(&self, id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE flagged_events SET auto_action_applied = 1 WHERE id = ? AND auto_action_applied = 0",
        )
        .bind(id as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_flagged_event(id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound),
        }
    }

    async fn release_auto_action(&self, id: u64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE flagged_events SET auto_action_applied = 0 WHERE id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_flagged_events(
        &self,
        guild_id: u64,
        status: Option<FlaggedEventStatus>,
        limit: usize,
    ) -> Result<Vec<FlaggedEvent>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT * FROM flagged_events
                    WHERE guild_id = ? AND status = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(guild_id as i64)
                .bind(status.as_str())
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM flagged_events
                    WHERE guild_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(guild_id as i64)
                .bind(sql_limit(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(storage)?;

        rows.iter().map(Self::row_to_flagged_event).collect()
    }
}

#[async_trait]
impl CaseRepository for SqliteModerationStore {
    async fn insert_case(
        &self,
        case: NewCase,
        created_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError> {
        // The MAX() read and the insert are one statement inside one
        // transaction. A unique violation or lock timeout is reported as a
        // conflict and retried by the caller. Dropping `tx` without commit
        // rolls it back.
        let mut tx = self.pool.begin().await.map_err(classify_write_error)?;

        let row = sqlx::query(
            r#"
            INSERT INTO moderation_cases
                (guild_id, case_number, target_user_id, moderator_user_id, case_type,
                 reason, duration_secs, created_at, expires_at, related_flagged_event_id)
            SELECT ?, COALESCE(MAX(case_number), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ?
            FROM moderation_cases
            WHERE guild_id = ?
            RETURNING *
            "#,
        )
        .bind(case.guild_id as i64)
        .bind(case.target_user_id as i64)
        .bind(case.moderator_user_id as i64)
        .bind(case.case_type.as_str())
        .bind(case.reason.as_deref())
        .bind(case.duration_secs.map(|s| s as i64))
        .bind(created_at.to_rfc3339())
        .bind(case.expires_at(created_at).map(|t| t.to_rfc3339()))
        .bind(case.related_flagged_event_id.map(|id| id as i64))
        .bind(case.guild_id as i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify_write_error)?;

        let created = Self::row_to_case(&row)?;
        tx.commit().await.map_err(classify_write_error)?;
        Ok(created)
    }

    async fn get_case_by_number(
        &self,
        guild_id: u64,
        case_number: u64,
    ) -> Result<Option<ModerationCase>, StoreError> {
        let row = sqlx::query("SELECT * FROM moderation_cases WHERE guild_id = ? AND case_number = ?")
            .bind(guild_id as i64)
            .bind(case_number as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(Self::row_to_case).transpose()
    }

    async fn update_case_reason(
        &self,
        id: u64,
        reason: &str,
        moderator_id: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE moderation_cases
            SET reason = ?, reason_updated_by = ?, reason_updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(reason)
        .bind(moderator_id as i64)
        .bind(updated_at.to_rfc3339())
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match row {
            Some(row) => Self::row_to_case(&row),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_cases_for_user(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM moderation_cases
            WHERE guild_id = ? AND target_user_id = ?
            ORDER BY case_number ASC
            "#,
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(Self::row_to_case).collect()
    }

    async fn list_cases(&self, guild_id: u64) -> Result<Vec<ModerationCase>, StoreError> {
        let rows = sqlx::query("SELECT * FROM moderation_cases WHERE guild_id = ? ORDER BY case_number ASC")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

        rows.iter().map(Self::row_to_case).collect()
    }
}
