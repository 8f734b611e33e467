// Error types for the moderation engine.
//
// Each layer gets its own enum so callers can tell a rejected config apart
// from a storage hiccup or a Discord outage.

use super::moderation_models::FlaggedEventStatus;
use thiserror::Error;

/// A config write was rejected. Never reaches detection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{field} must be between 0 and 1 (got {value})")]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("{field} must be at most {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("Prohibited word #{index} is blank")]
    BlankWord { index: usize },

    #[error("Invalid link domain: {0:?}")]
    InvalidDomain(String),

    #[error("Config guild id {config} does not match guild {expected}")]
    GuildMismatch { config: u64, expected: u64 },
}

/// Failure from a storage port.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record not found")]
    NotFound,

    /// Optimistic write lost a race (case number taken, status changed).
    #[error("Concurrent modification conflict")]
    Conflict,
}

/// Failure reported by the Discord collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    /// Worth retrying: network failure, rate limit, 5xx.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Retrying will not help: missing permissions, bad request.
    #[error("Permanent failure: {0}")]
    Permanent(String),
}

impl ActionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ActionError::Transient(_))
    }
}

/// A detector could not evaluate an event.
#[derive(Debug, Clone, Error)]
pub enum DetectorError {
    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Detector panicked: {0}")]
    Panicked(String),
}

/// Service-level error returned by the engine's public operations.
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Discord action failed: {0}")]
    Action(#[from] ActionError),

    #[error("Cannot move flagged event from {from} to {to}")]
    InvalidTransition {
        from: FlaggedEventStatus,
        to: FlaggedEventStatus,
    },

    #[error("Flagged event {0} not found")]
    FlaggedEventNotFound(u64),

    #[error("Case {0} not found")]
    CaseNotFound(u64),

    #[error("Case number allocation kept conflicting after {0} attempts")]
    CaseAllocationExhausted(u32),

    #[error("Guild {0} is disconnected; event rejected")]
    GuildDisconnected(u64),

    #[error("Reason is too long ({len} characters, max {max})")]
    ReasonTooLong { len: usize, max: usize },

    #[error("Action {0} cannot be recorded as a case")]
    NotACaseAction(String),
}
