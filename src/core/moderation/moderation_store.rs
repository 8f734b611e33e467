// Storage ports for the moderation engine.
//
// The core defines WHAT it needs; `infra::moderation` provides SQLite and
// in-memory implementations. Flagged events and cases are insert-only
// apart from the explicitly allowed status and reason updates.

use super::moderation_errors::StoreError;
use super::moderation_models::{
    FlaggedEvent, FlaggedEventStatus, GuildModerationConfig, ModerationCase, NewCase,
    NewFlaggedEvent, StatusUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Per-guild moderation settings.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get_config(&self, guild_id: u64) -> Result<Option<GuildModerationConfig>, StoreError>;

    async fn save_config(&self, config: &GuildModerationConfig) -> Result<(), StoreError>;
}

/// Flagged events and their review status.
#[async_trait]
pub trait FlaggedEventRepository: Send + Sync {
    /// Insert a new Pending event and return it with its assigned id.
    async fn insert_flagged_event(&self, event: NewFlaggedEvent)
        -> Result<FlaggedEvent, StoreError>;

    async fn get_flagged_event(&self, id: u64) -> Result<Option<FlaggedEvent>, StoreError>;

    /// Apply `update` only if the event's status is still `expected`.
    ///
    /// Returns `StoreError::Conflict` when someone else moved it first and
    /// `StoreError::NotFound` when the id is unknown.
    async fn update_flagged_event_status(
        &self,
        id: u64,
        expected: FlaggedEventStatus,
        update: StatusUpdate,
    ) -> Result<FlaggedEvent, StoreError>;

    /// Atomically set the auto-action flag. Returns `false` when it was
    /// already set, meaning another attempt owns (or finished) the action.
    async fn try_claim_auto_action(&self, id: u64) -> Result<bool, StoreError>;

    /// Clear the auto-action flag after a failed attempt.
    async fn release_auto_action(&self, id: u64) -> Result<(), StoreError>;

    /// Newest first.
    async fn list_flagged_events(
        &self,
        guild_id: u64,
        status: Option<FlaggedEventStatus>,
        limit: usize,
    ) -> Result<Vec<FlaggedEvent>, StoreError>;
}

/// Moderation cases with gap-free per-guild numbering.
#[async_trait]
pub trait CaseRepository: Send + Sync {
    /// Insert a case with `case_number = max(existing) + 1` for the guild,
    /// atomically. Returns `StoreError::Conflict` if the number was taken
    /// concurrently; the caller retries.
    async fn insert_case(
        &self,
        case: NewCase,
        created_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError>;

    async fn get_case_by_number(
        &self,
        guild_id: u64,
        case_number: u64,
    ) -> Result<Option<ModerationCase>, StoreError>;

    async fn update_case_reason(
        &self,
        id: u64,
        reason: &str,
        moderator_id: u64,
        updated_at: DateTime<Utc>,
    ) -> Result<ModerationCase, StoreError>;

    /// Oldest first.
    async fn list_cases_for_user(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<Vec<ModerationCase>, StoreError>;

    /// Every case in the guild, ordered by case number.
    async fn list_cases(&self, guild_id: u64) -> Result<Vec<ModerationCase>, StoreError>;
}

/// Everything the detection pipeline persists to.
pub trait ModerationStore: ConfigRepository + FlaggedEventRepository + CaseRepository {}

impl<T: ConfigRepository + FlaggedEventRepository + CaseRepository> ModerationStore for T {}
