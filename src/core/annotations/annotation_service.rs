use super::annotation_models::{ModNote, NewModNote, UserTag, WatchlistEntry};
use super::annotation_store::AnnotationStore;
use crate::core::moderation::StoreError;
use chrono::Utc;
use std::sync::Arc;

pub const MAX_TAG_LEN: usize = 32;
pub const MAX_WATCH_REASON_LEN: usize = 512;
pub const MAX_NOTE_LEN: usize = 1_000;

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Tag must be 1-32 characters")]
    InvalidTag,
    #[error("Text is too long ({len} characters, max {max})")]
    TooLong { len: usize, max: usize },
    #[error("Note cannot be empty")]
    EmptyNote,
    #[error("Note {0} not found")]
    NoteNotFound(u64),
}

fn check_len(text: &str, max: usize) -> Result<(), AnnotationError> {
    let len = text.chars().count();
    if len > max {
        return Err(AnnotationError::TooLong { len, max });
    }
    Ok(())
}

/// Lowercase, trim and bound a tag.
pub fn normalize_tag(tag: &str) -> Result<String, AnnotationError> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() || tag.chars().count() > MAX_TAG_LEN {
        return Err(AnnotationError::InvalidTag);
    }
    Ok(tag)
}

pub struct WatchlistService<S: AnnotationStore> {
    store: Arc<S>,
}

impl<S: AnnotationStore> WatchlistService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Add a user, or replace the reason if they are already watched.
    pub async fn add(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        added_by: u64,
    ) -> Result<WatchlistEntry, AnnotationError> {
        let reason = reason.trim();
        check_len(reason, MAX_WATCH_REASON_LEN)?;

        let entry = WatchlistEntry {
            guild_id,
            user_id,
            reason: reason.to_string(),
            added_by,
            added_at: Utc::now(),
        };
        self.store.upsert_watchlist(entry.clone()).await?;
        tracing::info!(guild_id, user_id, added_by, "User added to watchlist");
        Ok(entry)
    }

    pub async fn remove(&self, guild_id: u64, user_id: u64) -> Result<bool, AnnotationError> {
        Ok(self.store.remove_watchlist(guild_id, user_id).await?)
    }

    pub async fn list(&self, guild_id: u64) -> Result<Vec<WatchlistEntry>, AnnotationError> {
        Ok(self.store.list_watchlist(guild_id).await?)
    }

    pub async fn is_watched(&self, guild_id: u64, user_id: u64) -> Result<bool, AnnotationError> {
        Ok(self
            .store
            .get_watchlist_entry(guild_id, user_id)
            .await?
            .is_some())
    }
}

pub struct TagService<S: AnnotationStore> {
    store: Arc<S>,
}

impl<S: AnnotationStore> TagService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns false if the user already had the tag.
    pub async fn add(
        &self,
        guild_id: u64,
        user_id: u64,
        tag: &str,
        added_by: u64,
    ) -> Result<bool, AnnotationError> {
        let tag = normalize_tag(tag)?;
        Ok(self
            .store
            .add_tag(UserTag {
                guild_id,
                user_id,
                tag,
                added_by,
                added_at: Utc::now(),
            })
            .await?)
    }

    pub async fn remove(&self, guild_id: u64, user_id: u64, tag: &str) -> Result<bool, AnnotationError> {
        let tag = normalize_tag(tag)?;
        Ok(self.store.remove_tag(guild_id, user_id, &tag).await?)
    }

    pub async fn list(&self, guild_id: u64, user_id: u64) -> Result<Vec<UserTag>, AnnotationError> {
        Ok(self.store.list_tags(guild_id, user_id).await?)
    }
}

pub struct NoteService<S: AnnotationStore> {
    store: Arc<S>,
}

impl<S: AnnotationStore> NoteService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn add(
        &self,
        guild_id: u64,
        user_id: u64,
        author_id: u64,
        content: &str,
    ) -> Result<ModNote, AnnotationError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AnnotationError::EmptyNote);
        }
        check_len(content, MAX_NOTE_LEN)?;

        Ok(self
            .store
            .insert_note(NewModNote {
                guild_id,
                user_id,
                author_id,
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .await?)
    }

    pub async fn list(&self, guild_id: u64, user_id: u64) -> Result<Vec<ModNote>, AnnotationError> {
        Ok(self.store.list_notes(guild_id, user_id).await?)
    }

    pub async fn delete(&self, guild_id: u64, note_id: u64) -> Result<(), AnnotationError> {
        if !self.store.delete_note(guild_id, note_id).await? {
            return Err(AnnotationError::NoteNotFound(note_id));
        }
        Ok(())
    }
}
