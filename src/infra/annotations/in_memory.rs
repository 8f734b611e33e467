// In-memory AnnotationStore for tests.

use crate::core::annotations::{AnnotationStore, ModNote, NewModNote, UserTag, WatchlistEntry};
use crate::core::moderation::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct MemberKey {
    guild_id: u64,
    user_id: u64,
}

pub struct InMemoryAnnotationStore {
    watchlist: DashMap<MemberKey, WatchlistEntry>,
    tags: DashMap<MemberKey, Vec<UserTag>>,
    notes: DashMap<u64, ModNote>,
    next_note_id: AtomicU64,
}

impl InMemoryAnnotationStore {
    pub fn new() -> Self {
        Self {
            watchlist: DashMap::new(),
            tags: DashMap::new(),
            notes: DashMap::new(),
            next_note_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryAnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnnotationStore for InMemoryAnnotationStore {
    async fn upsert_watchlist(&self, entry: WatchlistEntry) -> Result<(), StoreError> {
        let key = MemberKey {
            guild_id: entry.guild_id,
            user_id: entry.user_id,
        };
        self.watchlist.insert(key, entry);
        Ok(())
    }

    async fn remove_watchlist(&self, guild_id: u64, user_id: u64) -> Result<bool, StoreError> {
        Ok(self
            .watchlist
            .remove(&MemberKey { guild_id, user_id })
            .is_some())
    }

    async fn get_watchlist_entry(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Option<WatchlistEntry>, StoreError> {
        Ok(self
            .watchlist
            .get(&MemberKey { guild_id, user_id })
            .map(|e| e.clone()))
    }

    async fn list_watchlist(&self, guild_id: u64) -> Result<Vec<WatchlistEntry>, StoreError> {
        let mut entries: Vec<WatchlistEntry> = self
            .watchlist
            .iter()
            .filter(|e| e.guild_id == guild_id)
            .map(|e| e.clone())
            .collect();
        entries.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.user_id.cmp(&b.user_id)));
        Ok(entries)
    }

    async fn add_tag(&self, tag: UserTag) -> Result<bool, StoreError> {
        let key = MemberKey {
            guild_id: tag.guild_id,
            user_id: tag.user_id,
        };
        let mut tags = self.tags.entry(key).or_default();
        if tags.iter().any(|t| t.tag == tag.tag) {
            return Ok(false);
        }
        tags.push(tag);
        Ok(true)
    }

    async fn remove_tag(&self, guild_id: u64, user_id: u64, tag: &str) -> Result<bool, StoreError> {
        let Some(mut tags) = self.tags.get_mut(&MemberKey { guild_id, user_id }) else {
            return Ok(false);
        };
        let before = tags.len();
        tags.retain(|t| t.tag != tag);
        Ok(tags.len() < before)
    }

    async fn list_tags(&self, guild_id: u64, user_id: u64) -> Result<Vec<UserTag>, StoreError> {
        Ok(self
            .tags
            .get(&MemberKey { guild_id, user_id })
            .map(|tags| tags.clone())
            .unwrap_or_default())
    }

    async fn insert_note(&self, note: NewModNote) -> Result<ModNote, StoreError> {
        let stored = ModNote {
            id: self.next_note_id.fetch_add(1, Ordering::Relaxed),
            guild_id: note.guild_id,
            user_id: note.user_id,
            author_id: note.author_id,
            content: note.content,
            created_at: note.created_at,
        };
        self.notes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_notes(&self, guild_id: u64, user_id: u64) -> Result<Vec<ModNote>, StoreError> {
        let mut notes: Vec<ModNote> = self
            .notes
            .iter()
            .filter(|n| n.guild_id == guild_id && n.user_id == user_id)
            .map(|n| n.clone())
            .collect();
        notes.sort_by_key(|n| n.id);
        Ok(notes)
    }

    async fn delete_note(&self, guild_id: u64, note_id: u64) -> Result<bool, StoreError> {
        Ok(self
            .notes
            .remove_if(&note_id, |_, note| note.guild_id == guild_id)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn note(guild_id: u64, user_id: u64, content: &str) -> NewModNote {
        NewModNote {
            guild_id,
            user_id,
            author_id: 7,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn notes_list_in_insert_order_per_member() {
        let store = InMemoryAnnotationStore::new();
        let first = store.insert_note(note(1, 2, "first")).await.unwrap();
        store.insert_note(note(1, 3, "other member")).await.unwrap();
        let second = store.insert_note(note(1, 2, "second")).await.unwrap();

        let ids: Vec<u64> = store.list_notes(1, 2).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn delete_note_requires_matching_guild() {
        let store = InMemoryAnnotationStore::new();
        let stored = store.insert_note(note(1, 2, "x")).await.unwrap();

        assert!(!store.delete_note(2, stored.id).await.unwrap());
        assert!(store.delete_note(1, stored.id).await.unwrap());
        assert!(!store.delete_note(1, stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn remove_tag_reports_missing() {
        let store = InMemoryAnnotationStore::new();
        assert!(!store.remove_tag(1, 2, "spammer").await.unwrap());
        store
            .add_tag(UserTag {
                guild_id: 1,
                user_id: 2,
                tag: "spammer".to_string(),
                added_by: 3,
                added_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(store.remove_tag(1, 2, "spammer").await.unwrap());
        assert!(store.list_tags(1, 2).await.unwrap().is_empty());
    }
}
