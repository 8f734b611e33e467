// In-memory implementation of the moderation storage ports.
//
// Used by the test suite.
// Case numbers are allocated while holding the guild's entry in
// `guild_cases`, so allocation and insert happen as one step and never
// conflict.

use crate::core::moderation::{
    CaseRepository, ConfigRepository, FlaggedEvent, FlaggedEventRepository, FlaggedEventStatus,
    GuildModerationConfig, ModerationCase, NewCase, NewFlaggedEvent, StatusUpdate, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub struct InMemoryModerationStore {
    configs: DashMap<u64, GuildModerationConfig>,
    flagged: DashMap<u64, FlaggedEvent>,
    next_flagged_id: AtomicU64,
    cases: DashMap<u64, ModerationCase>,
    /// Case ids per guild, in case-number order.
    guild_cases: DashMap<u64, Vec<u64>>,
    next_case_id: AtomicU64,
    failing_flagged_inserts: AtomicU32,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            flagged: DashMap::new(),
            next_flagged_id: AtomicU64::new(1),
            cases: DashMap::new(),
            guild_cases: DashMap::new(),
            next_case_id: AtomicU64::new(1),
            failing_flagged_inserts: AtomicU32::new(0),
        }
    }

    /// Make the next `count` flagged-event inserts fail with a storage error.
    pub fn fail_flagged_inserts(&self, count: u32) {
        self.failing_flagged_inserts.store(count, Ordering::SeqCst);
    }
}

impl Default for InMemoryModerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigRepository for InMemoryModerationStore {
    async fn get_config(&self, guild_id: u64) -> Result<Option<GuildModerationConfig>, StoreError> {
        Ok(self.configs.get(&guild_id).map(|c| c.clone()))
    }

    async fn save_config(&self, config: &GuildModerationConfig) -> Result<(), StoreError> {
        self.configs.insert(config.guild_id, config.clone());
        Ok(())
    }
}

#[async_trait]
impl FlaggedEventRepository for InMemoryModerationStore {
    async fn insert_flagged_event(
        &self,
        event: NewFlaggedEvent,
    ) -> Result<FlaggedEvent, StoreError> {
        if self
            .failing_flagged_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Storage("disk I/O error".to_string()));
        }
        let id = self.next_flagged_id.fetch_add(1, Ordering::Relaxed);
        let stored = FlaggedEvent {
            id,
            guild_id: event.guild_id,
            user_id: event.user_id,
            channel_id: event.channel_id,
            message_id: event.message_id,
            rule_type: event.rule_type,
            severity: event.severity,
            description: event.description,
            evidence: event.evidence,
            status: FlaggedEventStatus::Pending,
            action_taken: None,
            reviewed_by_user_id: None,
            created_at: event.created_at,
            reviewed_at: None,
            auto_action_applied: false,
        };
        self.flagged.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_flagged_event(&self, id: u64) -> Result<Option<FlaggedEvent>, StoreError> {
        Ok(self.flagged.get(&id).map(|e| e.clone()))
    }

    async fn update_flagged_event_status(
        &self,
        id: u64,
        expected: FlaggedEventStatus,
        update: StatusUpdate,
    ) -> Result<FlaggedEvent, StoreError> {
        let mut event = self.flagged.get_mut(&id).ok_or(StoreError::NotFound)?;
        if event.status != expected {
            return Err(StoreError::Conflict);
        }
        event.status = update.status;
        event.action_taken = update.action_taken;
        event.reviewed_by_user_id = update.reviewed_by_user_id;
        event.reviewed_at = Some(update.reviewed_at);
        Ok(event.clone())
    }

    async fn try_claim_auto_action(&self, id: u64) -> Result<bool, StoreError> {
        let mut event = self.flagged.get_mut(&id).ok_or(StoreError::NotFound)?;
        if event.auto_action_applied {
            return Ok(false);
        }
        event.auto_action_applied = true;
        Ok(true)
    }

    async fn release_auto_action(&self, id: u64) -> Result<(), StoreError> {
        let mut event = self.flagged.get_mut(&id).ok_or(StoreError::NotFound)?;
        event.auto_action_applied = false;
        Ok(())
    }

    async fn list_flagged_events(
        &self,
        guild_id: u64,
        status: Option<FlaggedEventStatus>,
        limit: usize,
    ) -> Result<Vec<FlaggedEvent>, StoreError> {
        let mut events: Vec<FlaggedEvent> = self
            .flagged
            .iter()
            .filter(|e| e.guild_id == guild_id && status.map_or(true, |s| e.status == s))
            .map(|e| e.clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events.truncate(limit);
        Ok(events)
    }
}

#[async_trait]
impl CaseRepository for InMemoryModerationStore {
    async fn insert_case(
        &self,
        case: NewCase,
        created_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError> {
        let mut ids = self.guild_cases.entry(case.guild_id).or_default();

        let stored = ModerationCase {
            id: self.next_case_id.fetch_add(1, Ordering::Relaxed),
            case_number: ids.len() as u64 + 1,
            guild_id: case.guild_id,
            target_user_id: case.target_user_id,
            moderator_user_id: case.moderator_user_id,
            case_type: case.case_type,
            expires_at: case.expires_at(created_at),
            reason: case.reason,
            duration_secs: case.duration_secs,
            created_at,
            related_flagged_event_id: case.related_flagged_event_id,
            reason_updated_by: None,
            reason_updated_at: None,
        };

        self.cases.insert(stored.id, stored.clone());
        ids.push(stored.id);
        Ok(stored)
    }

    async fn get_case_by_number(
        &self,
        guild_id: u64,
        case_number: u64,
    ) -> Result<Option<ModerationCase>, StoreError> {
        let id = self.guild_cases.get(&guild_id).and_then(|ids| {
            let index = usize::try_from(case_number.checked_sub(1)?).ok()?;
            ids.get(index).copied()
        });
        Ok(id.and_then(|id| self.cases.get(&id).map(|c| c.clone())))
    }

    async fn update_case_reason(
        &self,
        id: u64,
        reason: &str,
        moderator_id: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError> {
        let mut case = self.cases.get_mut(&id).ok_or(StoreError::NotFound)?;
        case.reason = Some(reason.to_string());
        case.reason_updated_by = Some(moderator_id);
        case.reason_updated_at = Some(updated_at);
        Ok(case.clone())
    }

    async fn list_cases_for_user(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<ModerationCase>, StoreError> {
        Ok(self
            .list_cases(guild_id)
            .await?
            .into_iter()
            .filter(|c| c.target_user_id == user_id)
            .collect())
    }

    async fn list_cases(&self, guild_id: u64) -> Result<Vec<ModerationCase>, StoreError> {
        // Copy the ids out before touching `cases`.
        let ids = self
            .guild_cases
            .get(&guild_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.cases.get(id).map(|c| c.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{CaseType, Evidence, RuleType, Severity};

    fn new_event(guild_id: u64) -> NewFlaggedEvent {
        NewFlaggedEvent {
            guild_id,
            user_id: 1,
            channel_id: None,
            message_id: None,
            rule_type: RuleType::Spam,
            severity: Severity::Low,
            description: "x".to_string(),
            evidence: Evidence::default(),
            created_at: Utc::now(),
        }
    }

    fn update(status: FlaggedEventStatus) -> StatusUpdate {
        StatusUpdate {
            status,
            action_taken: None,
            reviewed_by_user_id: Some(9),
            reviewed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let store = InMemoryModerationStore::new();
        let event = store.insert_flagged_event(new_event(1)).await.unwrap();

        store
            .update_flagged_event_status(event.id, FlaggedEventStatus::Pending, update(FlaggedEventStatus::Reviewed))
            .await
            .unwrap();
        assert!(matches!(
            store
                .update_flagged_event_status(event.id, FlaggedEventStatus::Pending, update(FlaggedEventStatus::Dismissed))
                .await,
            Err(StoreError::Conflict)
        ));
        assert!(matches!(
            store
                .update_flagged_event_status(999, FlaggedEventStatus::Pending, update(FlaggedEventStatus::Dismissed))
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let store = InMemoryModerationStore::new();
        let event = store.insert_flagged_event(new_event(1)).await.unwrap();

        assert!(store.try_claim_auto_action(event.id).await.unwrap());
        assert!(!store.try_claim_auto_action(event.id).await.unwrap());
        store.release_auto_action(event.id).await.unwrap();
        assert!(store.try_claim_auto_action(event.id).await.unwrap());
    }

    #[tokio::test]
    async fn cases_are_found_by_number_and_user() {
        let store = InMemoryModerationStore::new();
        for target in [5, 6, 5] {
            store
                .insert_case(
                    NewCase {
                        guild_id: 1,
                        target_user_id: target,
                        moderator_user_id: 2,
                        case_type: CaseType::Warn,
                        reason: None,
                        duration_secs: None,
                        related_flagged_event_id: None,
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
        }

        assert_eq!(store.get_case_by_number(1, 2).await.unwrap().unwrap().target_user_id, 6);
        assert!(store.get_case_by_number(1, 0).await.unwrap().is_none());
        assert!(store.get_case_by_number(1, 4).await.unwrap().is_none());
        assert!(store.get_case_by_number(2, 1).await.unwrap().is_none());

        let history: Vec<u64> = store
            .list_cases_for_user(1, 5)
            .await
            .unwrap()
            .iter()
            .map(|c| c.case_number)
            .collect();
        assert_eq!(history, vec![1, 3]);
    }

    #[tokio::test]
    async fn flagged_events_list_newest_first_with_filter() {
        let store = InMemoryModerationStore::new();
        let a = store.insert_flagged_event(new_event(1)).await.unwrap();
        let b = store.insert_flagged_event(new_event(1)).await.unwrap();
        store.insert_flagged_event(new_event(2)).await.unwrap();
        store
            .update_flagged_event_status(a.id, FlaggedEventStatus::Pending, update(FlaggedEventStatus::Dismissed))
            .await
            .unwrap();

        let all = store.list_flagged_events(1, None, 10).await.unwrap();
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let pending = store
            .list_flagged_events(1, Some(FlaggedEventStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }
}
