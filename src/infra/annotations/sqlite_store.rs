use crate::core::annotations::{AnnotationStore, ModNote, NewModNote, UserTag, WatchlistEntry};
use crate::core::moderation::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteAnnotationStore {
    pool: Pool<Sqlite>,
}

fn storage(e: impl ToString) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.get(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(storage)
}

impl SqliteAnnotationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watchlist (
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                reason TEXT NOT NULL,
                added_by INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (guild_id, user_id)
            );
            CREATE TABLE IF NOT EXISTS user_tags (
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                added_by INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (guild_id, user_id, tag)
            );
            CREATE TABLE IF NOT EXISTS mod_notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_mod_notes_member ON mod_notes(guild_id, user_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    fn row_to_watchlist(row: &SqliteRow) -> Result<WatchlistEntry, StoreError> {
        Ok(WatchlistEntry {
            guild_id: row.get::<i64, _>("guild_id") as u64,
            user_id: row.get::<i64, _>("user_id") as u64,
            reason: row.get("reason"),
            added_by: row.get::<i64, _>("added_by") as u64,
            added_at: parse_time(row, "added_at")?,
        })
    }

    fn row_to_note(row: &SqliteRow) -> Result<ModNote, StoreError> {
        Ok(ModNote {
            id: row.get::<i64, _>("id") as u64,
            guild_id: row.get::<i64, _>("guild_id") as u64,
            user_id: row.get::<i64, _>("user_id") as u64,
            author_id: row.get::<i64, _>("author_id") as u64,
            content: row.get("content"),
            created_at: parse_time(row, "created_at")?,
        })
    }
}

#[async_trait]
impl AnnotationStore for SqliteAnnotationStore {
    async fn upsert_watchlist(&self, entry: WatchlistEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO watchlist (guild_id, user_id, reason, added_by, added_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id) DO UPDATE SET
                reason = excluded.reason,
                added_by = excluded.added_by,
                added_at = excluded.added_at
            "#,
        )
        .bind(entry.guild_id as i64)
        .bind(entry.user_id as i64)
        .bind(&entry.reason)
        .bind(entry.added_by as i64)
        .bind(entry.added_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn remove_watchlist(&self, guild_id: u64, user_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM watchlist WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_watchlist_entry(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<WatchlistEntry>, StoreError> {
        let row = sqlx::query("SELECT * FROM watchlist WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(Self::row_to_watchlist).transpose()
    }

    async fn list_watchlist(&self, guild_id: u64) -> Result<Vec<WatchlistEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM watchlist WHERE guild_id = ? ORDER BY added_at, user_id")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(Self::row_to_watchlist).collect()
    }

    async fn add_tag(&self, tag: UserTag) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_tags (guild_id, user_id, tag, added_by, added_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, user_id, tag) DO NOTHING
            "#,
        )
        .bind(tag.guild_id as i64)
        .bind(tag.user_id as i64)
        .bind(&tag.tag)
        .bind(tag.added_by as i64)
        .bind(tag.added_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_tag(&self, guild_id: u64, user_id: u64, tag: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_tags WHERE guild_id = ? AND user_id = ? AND tag = ?")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .bind(tag)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self, guild_id: u64, user_id: u64) -> Result<Vec<UserTag>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM user_tags WHERE guild_id = ? AND user_id = ? ORDER BY added_at, tag",
        )
        .bind(guild_id as i64)
        .bind(user_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter()
            .map(|row| {
                Ok(UserTag {
                    guild_id,
                    user_id,
                    tag: row.get("tag"),
                    added_by: row.get::<i64, _>("added_by") as u64,
                    added_at: parse_time(row, "added_at")?,
                })
            })
            .collect()
    }

    async fn insert_note(&self, note: NewModNote) -> Result<ModNote, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO mod_notes (guild_id, user_id, author_id, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(note.guild_id as i64)
        .bind(note.user_id as i64)
        .bind(note.author_id as i64)
        .bind(&note.content)
        .bind(note.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Self::row_to_note(&row)
    }

    async fn list_notes(&self, guild_id: u64, user_id: u64) -> Result<Vec<ModNote>, StoreError> {
        let rows = sqlx::query("SELECT * FROM mod_notes WHERE guild_id = ? AND user_id = ? ORDER BY id")
            .bind(guild_id as i64)
            .bind(user_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        rows.iter().map(Self::row_to_note).collect()
    }

    async fn delete_note(&self, guild_id: u64, note_id: u64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM mod_notes WHERE id = ? AND guild_id = ?")
            .bind(note_id as i64)
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }
}
