use super::annotation_models::{ModNote, NewModNote, UserTag, WatchlistEntry};
use crate::core::moderation::StoreError;
use async_trait::async_trait;

#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Insert or replace the entry for (guild, user).
    async fn upsert_watchlist(&self, entry: WatchlistEntry) -> Result<(), StoreError>;
    /// Returns false when the user was not on the watchlist.
    async fn remove_watchlist(&self, guild_id: u64, user_id: u64) -> Result<bool, StoreError>;
    async fn get_watchlist_entry(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<WatchlistEntry>, StoreError>;
    /// Oldest first.
    async fn list_watchlist(&self, guild_id: u64) -> Result<Vec<WatchlistEntry>, StoreError>;

    /// Returns false when the user already had the tag.
    async fn add_tag(&self, tag: UserTag) -> Result<bool, StoreError>;
    async fn remove_tag(&self, guild_id: u64, user_id: u64, tag: &str) -> Result<bool, StoreError>;
    async fn list_tags(&self, guild_id: u64, user_id: u64) -> Result<Vec<UserTag>, StoreError>;

    async fn insert_note(&self, note: NewModNote) -> Result<ModNote, StoreError>;
    /// Oldest first.
    async fn list_notes(&self, guild_id: u64, user_id: u64) -> Result<Vec<ModNote>, StoreError>;
    /// Returns false when no note with this id exists in the guild.
    async fn delete_note(&self, guild_id: u64, note_id: u64) -> Result<bool, StoreError>;
}
