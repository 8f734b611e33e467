// Raid protection: join surges (guild-wide) and young accounts (per user).

use super::moderation_errors::DetectorError;
use super::moderation_models::{
    DetectionResult, DetectionSubject, Evidence, EvidenceItem, MemberJoined, ModerationAction,
    RaidAutoAction, RaidProtectionConfig, RuleType, Severity,
};
use crate::core::rate_window::{RateWindowTracker, SubjectKey};
use std::sync::Arc;

pub struct RaidProtectionDetector {
    tracker: Arc<RateWindowTracker>,
}

impl RaidProtectionDetector {
    pub fn new(tracker: Arc<RateWindowTracker>) -> Self {
        Self { tracker }
    }

    /// Check one join. Can return up to two results: a guild-wide surge and
    /// a per-user young-account flag.
    pub fn evaluate(
        &self,
        config: &RaidProtectionConfig,
        join: &MemberJoined,
    ) -> Result<Vec<DetectionResult>, DetectorError> {
        if !config.enabled {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();

        let count = self.tracker.record(
            join.guild_id,
            SubjectKey::Joins,
            join.timestamp,
            config.window(),
        );
        if count > config.max_joins_per_window as usize {
            tracing::warn!(
                guild_id = join.guild_id,
                joins = count,
                window_secs = config.window_seconds,
                "Join surge detected"
            );
            results.push(DetectionResult {
                rule_type: RuleType::RaidProtection,
                severity: Severity::High,
                subject: DetectionSubject::Guild,
                user_id: join.user_id,
                channel_id: None,
                message_id: None,
                description: format!(
                    "Possible raid: {} joins in {}s (limit {})",
                    count, config.window_seconds, config.max_joins_per_window
                ),
                evidence: Evidence::new(vec![EvidenceItem::JoinSurge {
                    count,
                    max: config.max_joins_per_window,
                    window_seconds: config.window_seconds,
                }]),
                should_auto_action: !config.auto_action.is_none(),
                recommended_action: ModerationAction::Guild(config.auto_action),
            });
        }

        let age_hours = join.account_age_hours();
        if config.min_account_age_hours > 0 && age_hours < i64::from(config.min_account_age_hours) {
            results.push(DetectionResult {
                rule_type: RuleType::RaidProtection,
                severity: Severity::Low,
                subject: DetectionSubject::User(join.user_id),
                user_id: join.user_id,
                channel_id: None,
                message_id: None,
                description: format!(
                    "Account is {}h old (minimum {}h)",
                    age_hours.max(0),
                    config.min_account_age_hours
                ),
                evidence: Evidence::new(vec![EvidenceItem::YoungAccount {
                    age_hours,
                    min_hours: config.min_account_age_hours,
                }]),
                // Young accounts go to the review queue, the guild-level
                // action is reserved for surges.
                should_auto_action: false,
                recommended_action: ModerationAction::Guild(RaidAutoAction::None),
            });
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn config() -> RaidProtectionConfig {
        RaidProtectionConfig {
            enabled: true,
            max_joins_per_window: 10,
            window_seconds: 10,
            min_account_age_hours: 24,
            auto_action: RaidAutoAction::LockInvites,
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn join(user_id: u64, millis: i64, account_age: Duration) -> MemberJoined {
        let timestamp = base() + Duration::milliseconds(millis);
        MemberJoined {
            guild_id: 1,
            user_id,
            account_created_at: timestamp - account_age,
            timestamp,
        }
    }

    #[test]
    fn eleventh_join_in_window_is_a_raid() {
        let detector = RaidProtectionDetector::new(Arc::new(RateWindowTracker::new()));
        let cfg = config();

        for i in 0..10 {
            let results = detector
                .evaluate(&cfg, &join(i, i as i64 * 700, Duration::days(30)))
                .unwrap();
            assert!(results.is_empty(), "join {i} flagged");
        }

        let results = detector
            .evaluate(&cfg, &join(99, 7_900, Duration::days(30)))
            .unwrap();
        assert_eq!(results.len(), 1);
        let raid = &results[0];
        assert_eq!(raid.subject, DetectionSubject::Guild);
        assert_eq!(raid.severity, Severity::High);
        assert!(raid.should_auto_action);
        assert_eq!(
            raid.recommended_action,
            ModerationAction::Guild(RaidAutoAction::LockInvites)
        );
    }

    #[test]
    fn young_account_is_flagged_without_a_surge() {
        let detector = RaidProtectionDetector::new(Arc::new(RateWindowTracker::new()));
        let results = detector
            .evaluate(&config(), &join(5, 0, Duration::hours(3)))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subject, DetectionSubject::User(5));
        assert!(!results[0].should_auto_action);
        assert!(matches!(
            results[0].evidence.items[0],
            EvidenceItem::YoungAccount { age_hours: 3, min_hours: 24 }
        ));
    }

    #[test]
    fn zero_minimum_age_disables_the_age_check() {
        let detector = RaidProtectionDetector::new(Arc::new(RateWindowTracker::new()));
        let cfg = RaidProtectionConfig {
            min_account_age_hours: 0,
            ..config()
        };
        let results = detector.evaluate(&cfg, &join(5, 0, Duration::zero())).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn disabled_protection_never_flags() {
        let tracker = Arc::new(RateWindowTracker::new());
        let detector = RaidProtectionDetector::new(Arc::clone(&tracker));
        let cfg = RaidProtectionConfig {
            enabled: false,
            ..config()
        };

        for i in 0..50 {
            let results = detector
                .evaluate(&cfg, &join(i, i as i64, Duration::minutes(1)))
                .unwrap();
            assert!(results.is_empty());
        }
        assert_eq!(tracker.tracked_guilds(), 0);
    }

    #[test]
    fn joins_outside_the_window_do_not_accumulate() {
        let detector = RaidProtectionDetector::new(Arc::new(RateWindowTracker::new()));
        let cfg = config();

        // One join every 2 seconds never has more than 5 in a 10s window.
        for i in 0..30 {
            let results = detector
                .evaluate(&cfg, &join(i, i as i64 * 2_000, Duration::days(30)))
                .unwrap();
            assert!(results.is_empty());
        }
    }
}
