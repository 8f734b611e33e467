// Case management - per-guild sequential case numbers.
//
// The store allocates `max + 1` atomically with the insert and reports a
// Conflict if another writer got there first. We retry those conflicts
// here so callers never see them. No lock is held while awaiting the
// store, and a failed insert never consumes a number, so the sequence
// stays gap-free.

use super::audit::{AuditEvent, AuditLog};
use super::moderation_errors::{ModerationError, StoreError};
use super::moderation_models::{ModerationCase, NewCase};
use super::moderation_store::CaseRepository;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_REASON_LEN: usize = 512;
const MAX_ALLOCATION_ATTEMPTS: u32 = 8;

pub struct CaseManager<S: CaseRepository> {
    store: Arc<S>,
    audit: AuditLog,
}

impl<S: CaseRepository> CaseManager<S> {
    pub fn new(store: Arc<S>, audit: AuditLog) -> Self {
        Self { store, audit }
    }

    /// Create a case with the guild's next case number.
    pub async fn create_case(&self, case: NewCase) -> Result<ModerationCase, ModerationError> {
        if let Some(reason) = &case.reason {
            check_reason(reason)?;
        }

        let mut attempt = 0;
        let created = loop {
            attempt += 1;
            match self.store.insert_case(case.clone(), Utc::now()).await {
                Ok(created) => break created,
                Err(StoreError::Conflict) if attempt < MAX_ALLOCATION_ATTEMPTS => {
                    tracing::debug!(
                        guild_id = case.guild_id,
                        attempt,
                        "Case number conflict, retrying"
                    );
                    // Small stagger so racing writers don't collide again.
                    tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 2)).await;
                }
                Err(StoreError::Conflict) => {
                    return Err(ModerationError::CaseAllocationExhausted(attempt));
                }
                Err(e) => return Err(e.into()),
            }
        };

        tracing::info!(
            guild_id = created.guild_id,
            case_number = created.case_number,
            case_type = %created.case_type,
            target_user_id = created.target_user_id,
            moderator_user_id = created.moderator_user_id,
            "Case created"
        );

        self.audit.publish(AuditEvent::CaseCreated {
            guild_id: created.guild_id,
            case_id: created.id,
            case_number: created.case_number,
            case_type: created.case_type,
            target_user_id: created.target_user_id,
            moderator_user_id: created.moderator_user_id,
            at: created.created_at,
        });

        Ok(created)
    }

    /// Replace a case's reason, recording who changed it.
    pub async fn update_reason(
        &self,
        case_id: u64,
        reason: &str,
        moderator_id: u64,
    ) -> Result<ModerationCase, ModerationError> {
        check_reason(reason)?;

        let updated = match self
            .store
            .update_case_reason(case_id, reason.trim(), moderator_id, Utc::now())
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::NotFound) => return Err(ModerationError::CaseNotFound(case_id)),
            Err(e) => return Err(e.into()),
        };

        self.audit.publish(AuditEvent::CaseReasonUpdated {
            guild_id: updated.guild_id,
            case_id: updated.id,
            case_number: updated.case_number,
            moderator_user_id: moderator_id,
            at: updated.reason_updated_at.unwrap_or_else(Utc::now),
        });

        Ok(updated)
    }

    pub async fn get_case(
        &self,
        guild_id: u64,
        case_number: u64,
    ) -> Result<Option<ModerationCase>, ModerationError> {
        Ok(self.store.get_case_by_number(guild_id, case_number).await?)
    }

    /// A user's cases in a guild, oldest first.
    pub async fn user_history(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        Ok(self.store.list_cases_for_user(guild_id, user_id).await?)
    }

    /// The latest `limit` cases in a guild, newest first.
    pub async fn recent_cases(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<Vec<ModerationCase>, ModerationError> {
        let mut cases = self.store.list_cases(guild_id).await?;
        cases.sort_by(|a, b| b.case_number.cmp(&a.case_number));
        cases.truncate(limit);
        Ok(cases)
    }
}

fn check_reason(reason: &str) -> Result<(), ModerationError> {
    let len = reason.trim().chars().count();
    if len > MAX_REASON_LEN {
        return Err(ModerationError::ReasonTooLong {
            len,
            max: MAX_REASON_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::CaseType;
    use crate::infra::moderation::InMemoryModerationStore;
    use std::collections::BTreeSet;

    fn new_case(guild_id: u64, target: u64) -> NewCase {
        NewCase {
            guild_id,
            target_user_id: target,
            moderator_user_id: 1,
            case_type: CaseType::Warn,
            reason: Some("being rude".to_string()),
            duration_secs: None,
            related_flagged_event_id: None,
        }
    }

    fn manager() -> CaseManager<InMemoryModerationStore> {
        CaseManager::new(Arc::new(InMemoryModerationStore::new()), AuditLog::new())
    }

    #[tokio::test]
    async fn case_numbers_start_at_one_per_guild() {
        let manager = manager();

        let a1 = manager.create_case(new_case(1, 10)).await.unwrap();
        let a2 = manager.create_case(new_case(1, 11)).await.unwrap();
        let b1 = manager.create_case(new_case(2, 10)).await.unwrap();

        assert_eq!(a1.case_number, 1);
        assert_eq!(a2.case_number, 2);
        assert_eq!(b1.case_number, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creations_are_gap_free() {
        let manager = Arc::new(manager());
        let n = 100u64;

        let mut handles = Vec::new();
        for i in 0..n {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.create_case(new_case(7, i)).await.unwrap().case_number
            }));
        }

        let mut numbers = BTreeSet::new();
        for handle in handles {
            assert!(numbers.insert(handle.await.unwrap()), "duplicate case number");
        }
        assert_eq!(numbers, (1..=n).collect::<BTreeSet<_>>());
    }

    #[tokio::test]
    async fn update_reason_records_the_moderator() {
        let manager = manager();
        let case = manager.create_case(new_case(1, 10)).await.unwrap();

        let updated = manager.update_reason(case.id, "spamming invites", 99).await.unwrap();

        assert_eq!(updated.reason.as_deref(), Some("spamming invites"));
        assert_eq!(updated.reason_updated_by, Some(99));
        assert!(updated.reason_updated_at.is_some());
        assert_eq!(updated.case_number, case.case_number);
    }

    #[tokio::test]
    async fn update_reason_on_unknown_case_fails() {
        let err = manager().update_reason(404, "x", 1).await.unwrap_err();
        assert!(matches!(err, ModerationError::CaseNotFound(404)));
    }

    #[tokio::test]
    async fn overlong_reasons_are_rejected() {
        let mut case = new_case(1, 10);
        case.reason = Some("x".repeat(MAX_REASON_LEN + 1));
        assert!(matches!(
            manager().create_case(case).await,
            Err(ModerationError::ReasonTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn case_creation_is_published() {
        let audit = AuditLog::new();
        let mut rx = audit.subscribe();
        let manager = CaseManager::new(Arc::new(InMemoryModerationStore::new()), audit);

        manager.create_case(new_case(1, 10)).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            AuditEvent::CaseCreated { case_number: 1, .. }
        ));
    }

    #[tokio::test]
    async fn mute_cases_get_an_expiry() {
        let manager = manager();
        let mut case = new_case(1, 10);
        case.case_type = CaseType::Mute;
        case.duration_secs = Some(600);

        let created = manager.create_case(case).await.unwrap();
        assert_eq!(
            created.expires_at,
            Some(created.created_at + chrono::Duration::seconds(600))
        );
    }

    #[tokio::test]
    async fn recent_cases_are_newest_first() {
        let manager = manager();
        for i in 0..5 {
            manager.create_case(new_case(1, i)).await.unwrap();
        }
        let recent = manager.recent_cases(1, 3).await.unwrap();
        let numbers: Vec<u64> = recent.iter().map(|c| c.case_number).collect();
        assert_eq!(numbers, vec![5, 4, 3]);
    }
}
