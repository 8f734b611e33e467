// Spam detection: message rate, mention floods and repeated content.
//
// NO Discord dependencies here - just pure domain logic over the shared
// RateWindowTracker and the similarity scorer.

use super::moderation_errors::DetectorError;
use super::moderation_models::{
    DetectionResult, DetectionSubject, Evidence, EvidenceItem, MessageCreated, ModerationAction,
    RuleType, Severity, SpamDetectionConfig,
};
use crate::core::rate_window::{RateWindowTracker, SubjectKey};
use crate::core::similarity;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// How many of a user's recent messages per channel are compared.
pub const RECENT_MESSAGES_PER_USER: usize = 5;

/// Tolerance when comparing a similarity score against the threshold.
pub const SIMILARITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct HistoryKey {
    guild_id: u64,
    channel_id: u64,
    user_id: u64,
}

#[derive(Debug, Clone)]
struct RecentMessage {
    normalized: String,
    timestamp: DateTime<Utc>,
}

pub struct SpamDetector {
    tracker: Arc<RateWindowTracker>,
    history: DashMap<HistoryKey, VecDeque<RecentMessage>>,
}

impl SpamDetector {
    pub fn new(tracker: Arc<RateWindowTracker>) -> Self {
        Self {
            tracker,
            history: DashMap::new(),
        }
    }

    /// Check one message. Returns `None` when the rule is disabled or
    /// nothing was violated.
    pub fn evaluate(
        &self,
        config: &SpamDetectionConfig,
        msg: &MessageCreated,
    ) -> Result<Option<DetectionResult>, DetectorError> {
        if !config.enabled {
            return Ok(None);
        }

        let window = config.window();
        let mut items = Vec::new();
        let mut severity: Option<Severity> = None;
        let mut reasons = Vec::new();

        // 1. Message rate
        let count = self.tracker.record(
            msg.guild_id,
            SubjectKey::User(msg.author_id),
            msg.timestamp,
            window,
        );
        if count > config.max_messages_per_window as usize {
            items.push(EvidenceItem::RateExceeded {
                count,
                max: config.max_messages_per_window,
                window_seconds: config.window_seconds,
            });
            severity = severity.max(Some(Severity::Medium));
            reasons.push(format!(
                "{} messages in {}s",
                count, config.window_seconds
            ));
        }

        // 2. Mentions
        if msg.mention_count > config.max_mentions_per_message {
            items.push(EvidenceItem::MentionsExceeded {
                count: msg.mention_count,
                max: config.max_mentions_per_message,
            });
            severity = severity.max(Some(Severity::High));
            reasons.push(format!("{} mentions in one message", msg.mention_count));
        }

        // 3. Duplicate content
        let normalized = similarity::normalize(&msg.content);
        let best = self.best_similarity(msg, &normalized, window);
        if best > 0.0 && best + SIMILARITY_EPSILON >= config.duplicate_message_threshold {
            items.push(EvidenceItem::DuplicateContent {
                similarity: best,
                threshold: config.duplicate_message_threshold,
            });
            severity = severity.max(Some(Severity::Low));
            reasons.push(format!("repeated message ({:.0}% similar)", best * 100.0));
        }
        self.remember(msg, normalized);

        let Some(severity) = severity else {
            return Ok(None);
        };

        tracing::debug!(
            guild_id = msg.guild_id,
            user_id = msg.author_id,
            violations = items.len(),
            "Spam detected"
        );

        Ok(Some(DetectionResult {
            rule_type: RuleType::Spam,
            severity,
            subject: DetectionSubject::User(msg.author_id),
            user_id: msg.author_id,
            channel_id: Some(msg.channel_id),
            message_id: Some(msg.message_id),
            description: format!("Spam: {}", reasons.join(", ")),
            evidence: Evidence::new(items).with_excerpt(&msg.content),
            should_auto_action: !config.auto_action.is_none(),
            recommended_action: ModerationAction::User(config.auto_action),
        }))
    }

    /// Highest similarity between this message and the user's recent
    /// messages in the same channel that are still inside the window.
    fn best_similarity(&self, msg: &MessageCreated, normalized: &str, window: Duration) -> f64 {
        if normalized.is_empty() {
            return 0.0;
        }
        let key = history_key(msg);
        let Some(mut recent) = self.history.get_mut(&key) else {
            return 0.0;
        };
        evict_old(&mut recent, msg.timestamp, window);

        recent
            .iter()
            .map(|prev| similarity::score_normalized(&prev.normalized, normalized))
            .fold(0.0, f64::max)
    }

    fn remember(&self, msg: &MessageCreated, normalized: String) {
        if normalized.is_empty() {
            return;
        }
        let mut recent = self.history.entry(history_key(msg)).or_default();
        recent.push_back(RecentMessage {
            normalized,
            timestamp: msg.timestamp,
        });
        while recent.len() > RECENT_MESSAGES_PER_USER {
            recent.pop_front();
        }
    }

    /// Drop message history older than `max_window`.
    pub fn sweep(&self, now: DateTime<Utc>, max_window: Duration) {
        self.history.retain(|_, recent| {
            evict_old(recent, now, max_window);
            !recent.is_empty()
        });
    }

    pub fn forget_guild(&self, guild_id: u64) {
        self.history.retain(|key, _| key.guild_id != guild_id);
    }
}

fn history_key(msg: &MessageCreated) -> HistoryKey {
    HistoryKey {
        guild_id: msg.guild_id,
        channel_id: msg.channel_id,
        user_id: msg.author_id,
    }
}

fn evict_old(recent: &mut VecDeque<RecentMessage>, now: DateTime<Utc>, window: Duration) {
    while recent
        .front()
        .is_some_and(|m| now.signed_duration_since(m.timestamp) >= window)
    {
        recent.pop_front();
    }
}
