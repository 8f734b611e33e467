// Review workflow for flagged events.
//
//   Pending ──► Reviewed ──► ActionTaken
//      │           └───────► Dismissed
//      ├──────────────────► ActionTaken
//      └──────────────────► Dismissed
//
// ActionTaken and Dismissed are terminal. Every write is a compare-and-set
// on the status we validated against, so two moderators clicking at once
// cannot both win.

use super::audit::{AuditEvent, AuditLog};
use super::case_manager::CaseManager;
use super::moderation_errors::{ModerationError, StoreError};
use super::moderation_models::{
    AutoAction, FlaggedEvent, FlaggedEventStatus, ModerationAction, ModerationCase, NewCase,
    NewFlaggedEvent, StatusUpdate,
};
use super::moderation_store::{CaseRepository, FlaggedEventRepository};
use chrono::Utc;
use std::sync::Arc;

const MAX_TRANSITION_ATTEMPTS: u32 = 3;

pub struct FlaggedEventStore<S: FlaggedEventRepository + CaseRepository> {
    store: Arc<S>,
    cases: Arc<CaseManager<S>>,
    audit: AuditLog,
}

impl<S: FlaggedEventRepository + CaseRepository> FlaggedEventStore<S> {
    pub fn new(store: Arc<S>, cases: Arc<CaseManager<S>>, audit: AuditLog) -> Self {
        Self {
            store,
            cases,
            audit,
        }
    }

    /// Persist a new Pending event.
    pub async fn record(&self, event: NewFlaggedEvent) -> Result<FlaggedEvent, ModerationError> {
        let created = self.store.insert_flagged_event(event).await?;

        tracing::info!(
            guild_id = created.guild_id,
            flagged_event_id = created.id,
            user_id = created.user_id,
            rule = %created.rule_type,
            severity = %created.severity,
            "Flagged event recorded"
        );

        self.audit.publish(AuditEvent::FlaggedEventCreated {
            guild_id: created.guild_id,
            flagged_event_id: created.id,
            user_id: created.user_id,
            rule_type: created.rule_type,
            at: created.created_at,
        });
        Ok(created)
    }

    pub async fn get(&self, id: u64) -> Result<FlaggedEvent, ModerationError> {
        self.store
            .get_flagged_event(id)
            .await?
            .ok_or(ModerationError::FlaggedEventNotFound(id))
    }

    /// Fetch an event, treating events from other guilds as missing.
    pub async fn get_in_guild(&self, guild_id: u64, id: u64) -> Result<FlaggedEvent, ModerationError> {
        let event = self.get(id).await?;
        if event.guild_id != guild_id {
            return Err(ModerationError::FlaggedEventNotFound(id));
        }
        Ok(event)
    }

    pub async fn pending(&self, guild_id: u64, limit: usize) -> Result<Vec<FlaggedEvent>, ModerationError> {
        self.list(guild_id, Some(FlaggedEventStatus::Pending), limit)
            .await
    }

    pub async fn list(
        &self,
        guild_id: u64,
        status: Option<FlaggedEventStatus>,
        limit: usize,
    ) -> Result<Vec<FlaggedEvent>, ModerationError> {
        Ok(self
            .store
            .list_flagged_events(guild_id, status, limit)
            .await?)
    }

    /// A moderator looked at the event but has not decided yet.
    pub async fn review(
        &self,
        guild_id: u64,
        id: u64,
        reviewer_id: u64,
    ) -> Result<FlaggedEvent, ModerationError> {
        self.get_in_guild(guild_id, id).await?;
        self.transition(id, FlaggedEventStatus::Reviewed, None, Some(reviewer_id))
            .await
    }

    pub async fn dismiss(
        &self,
        guild_id: u64,
        id: u64,
        reviewer_id: u64,
    ) -> Result<FlaggedEvent, ModerationError> {
        self.get_in_guild(guild_id, id).await?;
        self.transition(id, FlaggedEventStatus::Dismissed, None, Some(reviewer_id))
            .await
    }

    /// A moderator acted on the event: record a linked case and close it.
    pub async fn take_action(
        &self,
        guild_id: u64,
        id: u64,
        moderator_id: u64,
        action: AutoAction,
        reason: Option<String>,
    ) -> Result<(FlaggedEvent, ModerationCase), ModerationError> {
        let event = self.get_in_guild(guild_id, id).await?;
        let case_type = action
            .case_type()
            .ok_or_else(|| ModerationError::NotACaseAction(action.to_string()))?;

        // Reject before creating a case that would point at a closed event.
        if !event.status.can_transition_to(FlaggedEventStatus::ActionTaken) {
            return Err(ModerationError::InvalidTransition {
                from: event.status,
                to: FlaggedEventStatus::ActionTaken,
            });
        }

        let case = self
            .cases
            .create_case(NewCase {
                guild_id: event.guild_id,
                target_user_id: event.user_id,
                moderator_user_id: moderator_id,
                case_type,
                reason: reason.or_else(|| Some(event.description.clone())),
                duration_secs: action.duration_secs(),
                related_flagged_event_id: Some(event.id),
            })
            .await?;

        let updated = self
            .transition(
                id,
                FlaggedEventStatus::ActionTaken,
                Some(ModerationAction::User(action)),
                Some(moderator_id),
            )
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    guild_id,
                    flagged_event_id = id,
                    case_number = case.case_number,
                    error = %e,
                    "Case created but flagged event could not be closed"
                );
            })?;

        Ok((updated, case))
    }

    /// The engine applied an automatic action. No human reviewer.
    pub async fn mark_system_action(
        &self,
        id: u64,
        action: ModerationAction,
    ) -> Result<FlaggedEvent, ModerationError> {
        self.transition(id, FlaggedEventStatus::ActionTaken, Some(action), None)
            .await
    }

    async fn transition(
        &self,
        id: u64,
        to: FlaggedEventStatus,
        action_taken: Option<ModerationAction>,
        reviewer_id: Option<u64>,
    ) -> Result<FlaggedEvent, ModerationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.get(id).await?;
            if !current.status.can_transition_to(to) {
                return Err(ModerationError::InvalidTransition {
                    from: current.status,
                    to,
                });
            }

            let update = StatusUpdate {
                status: to,
                action_taken: action_taken.or(current.action_taken),
                reviewed_by_user_id: reviewer_id,
                reviewed_at: Utc::now(),
            };

            match self
                .store
                .update_flagged_event_status(id, current.status, update)
                .await
            {
                Ok(updated) => {
                    tracing::info!(
                        guild_id = updated.guild_id,
                        flagged_event_id = id,
                        from = %current.status,
                        to = %to,
                        reviewer_id = ?reviewer_id,
                        "Flagged event status changed"
                    );
                    self.audit.publish(AuditEvent::FlaggedEventStatusChanged {
                        guild_id: updated.guild_id,
                        flagged_event_id: id,
                        from: current.status,
                        to,
                        reviewer_id,
                        at: updated.reviewed_at.unwrap_or_else(Utc::now),
                    });
                    return Ok(updated);
                }
                // Someone moved it between our read and write; re-validate.
                Err(StoreError::Conflict) if attempt < MAX_TRANSITION_ATTEMPTS => continue,
                Err(StoreError::NotFound) => return Err(ModerationError::FlaggedEventNotFound(id)),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{CaseType, Evidence, RuleType, Severity};
    use crate::infra::moderation::InMemoryModerationStore;

    fn store() -> FlaggedEventStore<InMemoryModerationStore> {
        let repo = Arc::new(InMemoryModerationStore::new());
        let audit = AuditLog::new();
        let cases = Arc::new(CaseManager::new(Arc::clone(&repo), audit.clone()));
        FlaggedEventStore::new(repo, cases, audit)
    }

    fn new_event(guild_id: u64) -> NewFlaggedEvent {
        NewFlaggedEvent {
            guild_id,
            user_id: 10,
            channel_id: Some(20),
            message_id: Some(30),
            rule_type: RuleType::ContentFilter,
            severity: Severity::Medium,
            description: "Prohibited word: badword".to_string(),
            evidence: Evidence::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn new_events_start_pending() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();
        assert_eq!(event.status, FlaggedEventStatus::Pending);
        assert!(!event.auto_action_applied);
        assert_eq!(events.pending(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn review_then_dismiss() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();

        let reviewed = events.review(1, event.id, 5).await.unwrap();
        assert_eq!(reviewed.status, FlaggedEventStatus::Reviewed);
        assert_eq!(reviewed.reviewed_by_user_id, Some(5));

        let dismissed = events.dismiss(1, event.id, 6).await.unwrap();
        assert_eq!(dismissed.status, FlaggedEventStatus::Dismissed);
        assert_eq!(dismissed.reviewed_by_user_id, Some(6));
        assert!(events.pending(1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn terminal_events_reject_further_transitions() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();
        events.dismiss(1, event.id, 5).await.unwrap();

        assert!(matches!(
            events.review(1, event.id, 5).await,
            Err(ModerationError::InvalidTransition {
                from: FlaggedEventStatus::Dismissed,
                to: FlaggedEventStatus::Reviewed
            })
        ));
        assert!(events.dismiss(1, event.id, 5).await.is_err());
        assert!(events
            .take_action(1, event.id, 5, AutoAction::Warn, None)
            .await
            .is_err());
        assert!(events
            .mark_system_action(event.id, ModerationAction::User(AutoAction::Delete))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn take_action_links_a_case() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();

        let (updated, case) = events
            .take_action(1, event.id, 77, AutoAction::Kick, Some("repeat offender".into()))
            .await
            .unwrap();

        assert_eq!(updated.status, FlaggedEventStatus::ActionTaken);
        assert_eq!(updated.action_taken, Some(ModerationAction::User(AutoAction::Kick)));
        assert_eq!(case.case_type, CaseType::Kick);
        assert_eq!(case.related_flagged_event_id, Some(event.id));
        assert_eq!(case.moderator_user_id, 77);
        assert_eq!(case.target_user_id, 10);
    }

    #[tokio::test]
    async fn take_action_without_a_case_type_is_rejected() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();
        assert!(matches!(
            events.take_action(1, event.id, 1, AutoAction::None, None).await,
            Err(ModerationError::NotACaseAction(_))
        ));
        assert_eq!(
            events.get(event.id).await.unwrap().status,
            FlaggedEventStatus::Pending
        );
    }

    #[tokio::test]
    async fn events_from_other_guilds_are_not_visible() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();
        assert!(matches!(
            events.review(2, event.id, 5).await,
            Err(ModerationError::FlaggedEventNotFound(_))
        ));
    }

    #[tokio::test]
    async fn system_action_has_no_reviewer() {
        let events = store();
        let event = events.record(new_event(1)).await.unwrap();
        let updated = events
            .mark_system_action(event.id, ModerationAction::User(AutoAction::Delete))
            .await
            .unwrap();
        assert_eq!(updated.status, FlaggedEventStatus::ActionTaken);
        assert_eq!(updated.reviewed_by_user_id, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn only_one_concurrent_decision_wins() {
        let events = Arc::new(store());
        let event = events.record(new_event(1)).await.unwrap();

        let a = {
            let events = Arc::clone(&events);
            tokio::spawn(async move { events.dismiss(1, event.id, 1).await })
        };
        let b = {
            let events = Arc::clone(&events);
            tokio::spawn(async move {
                events
                    .mark_system_action(event.id, ModerationAction::User(AutoAction::Warn))
                    .await
            })
        };

        let outcomes = [a.await.unwrap().is_ok(), b.await.unwrap().is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    }
}
