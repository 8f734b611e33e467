// Automatic action execution.
//
// The gateway port is what the engine needs from Discord. Execution is
// at-most-once per flagged event: the repository flag is claimed before the
// first call and only released again when every attempt failed.

use super::audit::{AuditEvent, AuditLog};
use super::config_validation::MAX_MUTE_SECS;
use super::moderation_errors::{ActionError, ModerationError};
use super::moderation_models::{AutoAction, FlaggedEvent, ModerationAction, RaidAutoAction};
use super::moderation_store::FlaggedEventRepository;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// What a successful gateway call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Nothing to do: message already gone, user already banned, etc.
    AlreadySatisfied,
}

/// Discord operations the engine can request.
#[async_trait]
pub trait ModerationGateway: Send + Sync {
    async fn delete_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        message_id: u64,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError>;

    async fn warn_user(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<ActionOutcome, ActionError>;

    async fn timeout_user(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError>;

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<ActionOutcome, ActionError>;

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str)
        -> Result<ActionOutcome, ActionError>;

    async fn post_alert(
        &self,
        guild_id: u64,
        channel_id: u64,
        message: &str,
    ) -> Result<ActionOutcome, ActionError>;

    /// Revoke every active invite.
    async fn lock_invites(&self, guild_id: u64, reason: &str) -> Result<ActionOutcome, ActionError>;

    /// Raise verification to the highest level.
    async fn lock_server(&self, guild_id: u64, reason: &str) -> Result<ActionOutcome, ActionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff with up to 50% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_cap = (exp.as_millis() / 2) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        exp + Duration::from_millis(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Completed { outcome: ActionOutcome, attempts: u32 },
    /// Another attempt already owns this event's action.
    AlreadyClaimed,
}

pub struct AutoActionExecutor<S: FlaggedEventRepository, G: ModerationGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    policy: RetryPolicy,
    audit: AuditLog,
}

impl<S: FlaggedEventRepository, G: ModerationGateway> AutoActionExecutor<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, policy: RetryPolicy, audit: AuditLog) -> Self {
        Self {
            store,
            gateway,
            policy,
            audit,
        }
    }

    /// Run `action` for `event` at most once.
    ///
    /// On failure the claim is released, an AutoActionFailed event is
    /// published and the error returned; the flagged event stays as it was.
    pub async fn execute(
        &self,
        event: &FlaggedEvent,
        action: ModerationAction,
        alert_channel_id: Option<u64>,
    ) -> Result<Execution, ModerationError> {
        if action.is_none() {
            return Ok(Execution::Completed {
                outcome: ActionOutcome::AlreadySatisfied,
                attempts: 0,
            });
        }

        if !self.store.try_claim_auto_action(event.id).await? {
            tracing::debug!(
                guild_id = event.guild_id,
                flagged_event_id = event.id,
                "Auto-action already claimed"
            );
            return Ok(Execution::AlreadyClaimed);
        }

        let mut attempts = 0;
        let result = loop {
            attempts += 1;
            match self.dispatch(event, action, alert_channel_id).await {
                Ok(outcome) => break Ok(outcome),
                Err(e) if e.is_transient() && attempts < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempts);
                    tracing::warn!(
                        guild_id = event.guild_id,
                        flagged_event_id = event.id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Auto-action failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        match result {
            Ok(outcome) => {
                tracing::info!(
                    guild_id = event.guild_id,
                    flagged_event_id = event.id,
                    action = %action,
                    ?outcome,
                    attempts,
                    "Auto-action executed"
                );
                self.audit.publish(AuditEvent::AutoActionExecuted {
                    guild_id: event.guild_id,
                    flagged_event_id: event.id,
                    action,
                    already_satisfied: outcome == ActionOutcome::AlreadySatisfied,
                    attempts,
                    at: Utc::now(),
                });
                Ok(Execution::Completed { outcome, attempts })
            }
            Err(e) => {
                tracing::error!(
                    guild_id = event.guild_id,
                    flagged_event_id = event.id,
                    action = %action,
                    attempts,
                    error = %e,
                    "Auto-action failed"
                );
                if let Err(release_err) = self.store.release_auto_action(event.id).await {
                    tracing::error!(
                        flagged_event_id = event.id,
                        error = %release_err,
                        "Failed to release auto-action claim"
                    );
                }
                self.audit.publish(AuditEvent::AutoActionFailed {
                    guild_id: event.guild_id,
                    flagged_event_id: event.id,
                    action,
                    error: e.to_string(),
                    attempts,
                    at: Utc::now(),
                });
                Err(e.into())
            }
        }
    }

    async fn dispatch(
        &self,
        event: &FlaggedEvent,
        action: ModerationAction,
        alert_channel_id: Option<u64>,
    ) -> Result<ActionOutcome, ActionError> {
        let guild_id = event.guild_id;
        let user_id = event.user_id;
        let reason = format!("AutoMod: {}", event.description);

        match action {
            ModerationAction::User(action) => match action {
                AutoAction::None => Ok(ActionOutcome::AlreadySatisfied),
                AutoAction::Delete => {
                    let (Some(channel_id), Some(message_id)) = (event.channel_id, event.message_id)
                    else {
                        return Err(ActionError::Permanent(
                            "No message attached to this event".to_string(),
                        ));
                    };
                    self.gateway
                        .delete_message(guild_id, channel_id, message_id, &reason)
                        .await
                }
                AutoAction::Warn => self.gateway.warn_user(guild_id, user_id, &reason).await,
                AutoAction::Mute { duration_secs } => {
                    let secs = duration_secs.min(MAX_MUTE_SECS) as i64;
                    let until = Utc::now() + ChronoDuration::seconds(secs);
                    self.gateway
                        .timeout_user(guild_id, user_id, until, &reason)
                        .await
                }
                AutoAction::Kick => self.gateway.kick_user(guild_id, user_id, &reason).await,
                AutoAction::Ban => self.gateway.ban_user(guild_id, user_id, &reason).await,
            },
            ModerationAction::Guild(action) => match action {
                RaidAutoAction::None => Ok(ActionOutcome::AlreadySatisfied),
                RaidAutoAction::AlertOnly => {
                    let Some(channel_id) = alert_channel_id else {
                        return Err(ActionError::Permanent(
                            "No alert channel configured".to_string(),
                        ));
                    };
                    self.gateway
                        .post_alert(guild_id, channel_id, &format!("🚨 {}", event.description))
                        .await
                }
                RaidAutoAction::LockInvites => self.gateway.lock_invites(guild_id, &reason).await,
                RaidAutoAction::LockServer => self.gateway.lock_server(guild_id, &reason).await,
            },
        }
    }
}

/// Scriptable gateway for tests: records every call and replays queued
/// results before falling back to `Applied`.
#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum GatewayCall {
        Delete { channel_id: u64, message_id: u64 },
        Warn { user_id: u64 },
        Timeout { user_id: u64 },
        Kick { user_id: u64 },
        Ban { user_id: u64 },
        Alert { channel_id: u64 },
        LockInvites,
        LockServer,
    }

    #[derive(Default)]
    pub struct RecordingGateway {
        calls: Mutex<Vec<(u64, GatewayCall)>>,
        script: Mutex<VecDeque<Result<ActionOutcome, ActionError>>>,
    }

    impl RecordingGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_result(&self, result: Result<ActionOutcome, ActionError>) {
            self.script.lock().unwrap().push_back(result);
        }

        pub fn calls(&self) -> Vec<GatewayCall> {
            self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
        }

        pub fn count(&self, call: &GatewayCall) -> usize {
            self.calls().iter().filter(|c| *c == call).count()
        }

        fn record(&self, guild_id: u64, call: GatewayCall) -> Result<ActionOutcome, ActionError> {
            self.calls.lock().unwrap().push((guild_id, call));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ActionOutcome::Applied))
        }
    }

    #[async_trait]
    impl ModerationGateway for RecordingGateway {
        async fn delete_message(
            &self,
            guild_id: u64,
            channel_id: u64,
            message_id: u64,
            _reason: &str,
        ) -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Delete { channel_id, message_id })
        }

        async fn warn_user(&self, guild_id: u64, user_id: u64, _reason: &str)
            -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Warn { user_id })
        }

        async fn timeout_user(
            &self,
            guild_id: u64,
            user_id: u64,
            _until: DateTime<Utc>,
            _reason: &str,
        ) -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Timeout { user_id })
        }

        async fn kick_user(&self, guild_id: u64, user_id: u64, _reason: &str)
            -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Kick { user_id })
        }

        async fn ban_user(&self, guild_id: u64, user_id: u64, _reason: &str)
            -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Ban { user_id })
        }

        async fn post_alert(
            &self,
            guild_id: u64,
            channel_id: u64,
            _message: &str,
        ) -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::Alert { channel_id })
        }

        async fn lock_invites(&self, guild_id: u64, _reason: &str) -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::LockInvites)
        }

        async fn lock_server(&self, guild_id: u64, _reason: &str) -> Result<ActionOutcome, ActionError> {
            self.record(guild_id, GatewayCall::LockServer)
        }
    }
}
