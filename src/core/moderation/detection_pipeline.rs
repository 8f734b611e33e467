// Detection pipeline - from a guild event to flagged events, actions and cases.
//
// Messages go to the spam and content detectors, joins to raid protection.
// Detectors are synchronous and run in isolation: an error or panic in one
// never stops the others. Surviving results are debounced per
// (guild, subject, rule) and recorded as Pending flagged events. Results
// that carry an automatic action are executed once, get a linked case when
// the action targets a user, and close as ActionTaken.

use super::auto_action::{AutoActionExecutor, Execution, ModerationGateway};
use super::case_manager::CaseManager;
use super::config_service::ModerationConfigService;
use super::content_filter::ContentFilterDetector;
use super::debounce::DebounceTracker;
use super::flagged_events::FlaggedEventStore;
use super::moderation_errors::{DetectorError, ModerationError};
use super::moderation_models::{
    AutoAction, DetectionResult, DetectionSubject, Evidence, EvidenceItem, FlaggedEvent,
    GuildEvent, GuildModerationConfig, ModerationAction, NewCase, NewFlaggedEvent, RuleType,
    Severity,
};
use super::moderation_store::ModerationStore;
use super::raid_detector::RaidProtectionDetector;
use super::spam_detector::SpamDetector;
use crate::core::rate_window::RateWindowTracker;
use chrono::{DateTime, Duration, Utc};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What to do when a detector fails on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorFailurePolicy {
    /// Treat the failure as "no violation".
    #[default]
    FailOpen,
    /// Record a Pending event for manual review. Never auto-actioned.
    FailClosed,
}

impl std::str::FromStr for DetectorFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "failopen" | "open" => Ok(DetectorFailurePolicy::FailOpen),
            "failclosed" | "closed" => Ok(DetectorFailurePolicy::FailClosed),
            other => Err(format!("Unknown detector failure policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub debounce: Duration,
    pub failure_policy: DetectorFailurePolicy,
    /// Recorded as the moderator on cases created by automatic actions.
    pub system_moderator_id: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::seconds(3),
            failure_policy: DetectorFailurePolicy::default(),
            system_moderator_id: 0,
        }
    }
}

pub struct DetectionPipeline<S: ModerationStore, G: ModerationGateway> {
    tracker: Arc<RateWindowTracker>,
    spam: SpamDetector,
    content: ContentFilterDetector,
    raid: RaidProtectionDetector,
    debounce: DebounceTracker,
    config: Arc<ModerationConfigService<S>>,
    flagged: Arc<FlaggedEventStore<S>>,
    cases: Arc<CaseManager<S>>,
    executor: AutoActionExecutor<S, G>,
    settings: PipelineSettings,
}

impl<S: ModerationStore, G: ModerationGateway> DetectionPipeline<S, G> {
    pub fn new(
        tracker: Arc<RateWindowTracker>,
        config: Arc<ModerationConfigService<S>>,
        flagged: Arc<FlaggedEventStore<S>>,
        cases: Arc<CaseManager<S>>,
        executor: AutoActionExecutor<S, G>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            spam: SpamDetector::new(Arc::clone(&tracker)),
            content: ContentFilterDetector::new(),
            raid: RaidProtectionDetector::new(Arc::clone(&tracker)),
            tracker,
            debounce: DebounceTracker::new(),
            config,
            flagged,
            cases,
            executor,
            settings,
        }
    }

    /// Evaluate one event. Returns the flagged events it created, in their
    /// final state.
    ///
    /// Each result is handled on its own. If one cannot be recorded, its
    /// debounce slot is released, the remaining results are still handled,
    /// and the first such error is returned at the end.
    pub async fn process(&self, event: &GuildEvent) -> Result<Vec<FlaggedEvent>, ModerationError> {
        let guild_id = event.guild_id();
        let config = self.config.get(guild_id).await?;

        let results = self.detect(&config, event);
        let mut created = Vec::new();
        let mut first_error = None;

        for result in results {
            let interval = self.debounce_interval(&config, &result);
            let (subject, rule) = (result.subject, result.rule_type);
            if !self
                .debounce
                .should_emit(guild_id, subject, rule, event.timestamp(), interval)
            {
                tracing::debug!(guild_id, rule = %rule, subject = ?subject, "Detection debounced");
                continue;
            }

            match self.handle(&config, result).await {
                Ok(flagged) => created.push(flagged),
                Err(e) => {
                    self.debounce
                        .release(guild_id, subject, rule, event.timestamp());
                    tracing::error!(
                        guild_id,
                        rule = %rule,
                        subject = ?subject,
                        error = %e,
                        "Failed to record flagged event"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(created),
        }
    }

    /// Run the detectors that apply to this event.
    fn detect(&self, config: &GuildModerationConfig, event: &GuildEvent) -> Vec<DetectionResult> {
        let mut results = Vec::new();

        match event {
            GuildEvent::Message(msg) => {
                let spam = run_isolated(|| self.spam.evaluate(&config.spam, msg));
                self.collect(spam.map(|r| r.into_iter().collect()), RuleType::Spam, event, &mut results);

                let content = run_isolated(|| self.content.evaluate(&config.content_filter, msg));
                self.collect(
                    content.map(|r| r.into_iter().collect()),
                    RuleType::ContentFilter,
                    event,
                    &mut results,
                );
            }
            GuildEvent::Join(join) => {
                let raid = run_isolated(|| self.raid.evaluate(&config.raid, join));
                self.collect(raid, RuleType::RaidProtection, event, &mut results);
            }
        }

        results
    }

    fn collect(
        &self,
        outcome: Result<Vec<DetectionResult>, DetectorError>,
        rule: RuleType,
        event: &GuildEvent,
        results: &mut Vec<DetectionResult>,
    ) {
        match outcome {
            Ok(found) => results.extend(found),
            Err(error) => {
                tracing::error!(
                    guild_id = event.guild_id(),
                    rule = %rule,
                    error = %error,
                    policy = ?self.settings.failure_policy,
                    "Detector failed"
                );
                if self.settings.failure_policy == DetectorFailurePolicy::FailClosed {
                    results.push(failure_result(rule, event, &error));
                }
            }
        }
    }

    fn debounce_interval(&self, config: &GuildModerationConfig, result: &DetectionResult) -> Duration {
        match (result.subject, result.rule_type) {
            // One raid, one lockdown.
            (DetectionSubject::Guild, RuleType::RaidProtection) => {
                self.settings.debounce.max(config.raid.window())
            }
            _ => self.settings.debounce,
        }
    }

    /// Only a failure to record the flagged event is returned. Anything
    /// after that is logged and leaves the event in whatever state it
    /// reached.
    async fn handle(
        &self,
        config: &GuildModerationConfig,
        result: DetectionResult,
    ) -> Result<FlaggedEvent, ModerationError> {
        let flagged = self
            .flagged
            .record(NewFlaggedEvent::from_detection(config.guild_id, &result, Utc::now()))
            .await?;

        if !result.should_auto_action || result.recommended_action.is_none() {
            return Ok(flagged);
        }

        let action = result.recommended_action;
        match self
            .executor
            .execute(&flagged, action, config.alert_channel_id)
            .await
        {
            Ok(Execution::Completed { .. }) => {}
            Ok(Execution::AlreadyClaimed) => return Ok(self.latest(flagged).await),
            Err(e) => {
                tracing::warn!(
                    guild_id = flagged.guild_id,
                    flagged_event_id = flagged.id,
                    error = %e,
                    "Auto-action did not run, event left for review"
                );
                return Ok(flagged);
            }
        }

        if let ModerationAction::User(user_action) = action {
            self.record_system_case(&flagged, user_action).await;
        }

        match self.flagged.mark_system_action(flagged.id, action).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                // Usually a moderator closed the event while the action ran.
                tracing::warn!(
                    guild_id = flagged.guild_id,
                    flagged_event_id = flagged.id,
                    error = %e,
                    "Could not mark flagged event as actioned"
                );
                Ok(self.latest(flagged).await)
            }
        }
    }

    /// Re-read an event, falling back to the copy we already hold.
    async fn latest(&self, flagged: FlaggedEvent) -> FlaggedEvent {
        match self.flagged.get(flagged.id).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(flagged_event_id = flagged.id, error = %e, "Failed to reload flagged event");
                flagged
            }
        }
    }

    /// Case for an applied per-user action. The action already happened, so
    /// a failure here is logged rather than returned.
    async fn record_system_case(&self, flagged: &FlaggedEvent, action: AutoAction) {
        let Some(case_type) = action.case_type() else {
            return;
        };

        let case = NewCase {
            guild_id: flagged.guild_id,
            target_user_id: flagged.user_id,
            moderator_user_id: self.settings.system_moderator_id,
            case_type,
            reason: Some(format!("[AutoMod] {}", flagged.description)),
            duration_secs: action.duration_secs(),
            related_flagged_event_id: Some(flagged.id),
        };

        if let Err(e) = self.cases.create_case(case).await {
            tracing::error!(
                guild_id = flagged.guild_id,
                flagged_event_id = flagged.id,
                error = %e,
                "Failed to record case for automatic action"
            );
        }
    }

    /// Evict idle rate, history and debounce state.
    pub fn sweep(&self, now: DateTime<Utc>, max_window: Duration) {
        let removed = self.tracker.sweep(now, max_window);
        self.spam.sweep(now, max_window);
        self.debounce.sweep(now, max_window.max(self.settings.debounce));
        if removed > 0 {
            tracing::debug!(removed, "Swept idle rate windows");
        }
    }

    /// Drop every piece of in-memory state for a guild.
    pub fn forget_guild(&self, guild_id: u64) {
        self.tracker.forget_guild(guild_id);
        self.spam.forget_guild(guild_id);
        self.content.forget_guild(guild_id);
        self.debounce.forget_guild(guild_id);
    }
}

/// Run a detector, turning a panic into a `DetectorError`.
pub fn run_isolated<T>(
    detector: impl FnOnce() -> Result<T, DetectorError>,
) -> Result<T, DetectorError> {
    catch_unwind(AssertUnwindSafe(detector))
        .unwrap_or_else(|payload| Err(DetectorError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Review-only result standing in for a failed detector.
fn failure_result(rule: RuleType, event: &GuildEvent, error: &DetectorError) -> DetectionResult {
    let (user_id, channel_id, message_id) = match event {
        GuildEvent::Message(msg) => (msg.author_id, Some(msg.channel_id), Some(msg.message_id)),
        GuildEvent::Join(join) => (join.user_id, None, None),
    };

    DetectionResult {
        rule_type: rule,
        severity: Severity::Medium,
        subject: DetectionSubject::User(user_id),
        user_id,
        channel_id,
        message_id,
        description: format!("{} check failed, needs manual review", rule),
        evidence: Evidence::new(vec![EvidenceItem::DetectorFailure {
            detector: rule.as_str().to_string(),
            error: error.to_string(),
        }]),
        should_auto_action: false,
        recommended_action: ModerationAction::User(AutoAction::None),
    }
}
