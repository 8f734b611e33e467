// Observable domain events for downstream audit logging.
//
// The engine publishes, it never persists: whoever wants a durable audit
// trail subscribes to the broadcast channel.

use super::moderation_models::{CaseType, FlaggedEventStatus, ModerationAction, RuleType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

const AUDIT_CHANNEL_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    FlaggedEventCreated {
        guild_id: u64,
        flagged_event_id: u64,
        user_id: u64,
        rule_type: RuleType,
        at: DateTime<Utc>,
    },
    FlaggedEventStatusChanged {
        guild_id: u64,
        flagged_event_id: u64,
        from: FlaggedEventStatus,
        to: FlaggedEventStatus,
        reviewer_id: Option<u64>,
        at: DateTime<Utc>,
    },
    CaseCreated {
        guild_id: u64,
        case_id: u64,
        case_number: u64,
        case_type: CaseType,
        target_user_id: u64,
        moderator_user_id: u64,
        at: DateTime<Utc>,
    },
    CaseReasonUpdated {
        guild_id: u64,
        case_id: u64,
        case_number: u64,
        moderator_user_id: u64,
        at: DateTime<Utc>,
    },
    AutoActionExecuted {
        guild_id: u64,
        flagged_event_id: u64,
        action: ModerationAction,
        already_satisfied: bool,
        attempts: u32,
        at: DateTime<Utc>,
    },
    AutoActionFailed {
        guild_id: u64,
        flagged_event_id: u64,
        action: ModerationAction,
        error: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn guild_id(&self) -> u64 {
        match self {
            AuditEvent::FlaggedEventCreated { guild_id, .. }
            | AuditEvent::FlaggedEventStatusChanged { guild_id, .. }
            | AuditEvent::CaseCreated { guild_id, .. }
            | AuditEvent::CaseReasonUpdated { guild_id, .. }
            | AuditEvent::AutoActionExecuted { guild_id, .. }
            | AuditEvent::AutoActionFailed { guild_id, .. } => *guild_id,
        }
    }
}

/// Broadcast publisher shared by the services.
#[derive(Clone)]
pub struct AuditLog {
    sender: broadcast::Sender<AuditEvent>,
}

impl AuditLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(AUDIT_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: AuditEvent) {
        tracing::debug!(guild_id = event.guild_id(), ?event, "Audit event");
        let _ = self.sender.send(event);
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
