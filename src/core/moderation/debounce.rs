// Suppresses repeat detections for the same (guild, subject, rule) inside a
// short interval, so a burst of borderline messages yields one flagged event.

use super::moderation_models::{DetectionSubject, RuleType};
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct DebounceKey {
    guild_id: u64,
    subject: DetectionSubject,
    rule: RuleType,
}

pub struct DebounceTracker {
    last_emitted: DashMap<DebounceKey, DateTime<Utc>>,
}

impl DebounceTracker {
    pub fn new() -> Self {
        Self {
            last_emitted: DashMap::new(),
        }
    }

    /// Returns true and remembers `at` if nothing was emitted for this key
    /// within `interval` before `at`. Check and update happen under the same
    /// entry lock.
    pub fn should_emit(
        &self,
        guild_id: u64,
        subject: DetectionSubject,
        rule: RuleType,
        at: DateTime<Utc>,
        interval: Duration,
    ) -> bool {
        let key = DebounceKey {
            guild_id,
            subject,
            rule,
        };
        match self.last_emitted.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
            Entry::Occupied(mut slot) => {
                if at.signed_duration_since(*slot.get()) < interval {
                    false
                } else {
                    slot.insert(at);
                    true
                }
            }
        }
    }

    /// Drop keys whose last emission is older than `max_interval`.
    pub fn sweep(&self, now: DateTime<Utc>, max_interval: Duration) -> usize {
        let before = self.last_emitted.len();
        self.last_emitted
            .retain(|_, last| now.signed_duration_since(*last) < max_interval);
        before - self.last_emitted.len()
    }

    /// Undo an emission made at `at`, so the next hit for the key is not
    /// suppressed. Leaves the key alone if a later emission replaced it.
    pub fn release(&self, guild_id: u64, subject: DetectionSubject, rule: RuleType, at: DateTime<Utc>) {
        let key = DebounceKey {
            guild_id,
            subject,
            rule,
        };
        self.last_emitted.remove_if(&key, |_, last| *last == at);
    }

    pub fn forget_guild(&self, guild_id: u64) {
        self.last_emitted.retain(|key, _| key.guild_id != guild_id);
    }
}

impl Default for DebounceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn second_hit_inside_interval_is_suppressed() {
        let debounce = DebounceTracker::new();
        let user = DetectionSubject::User(1);
        let interval = Duration::seconds(3);

        assert!(debounce.should_emit(1, user, RuleType::Spam, t(0), interval));
        assert!(!debounce.should_emit(1, user, RuleType::Spam, t(2), interval));
        assert!(debounce.should_emit(1, user, RuleType::Spam, t(3), interval));
    }

    #[test]
    fn keys_are_independent() {
        let debounce = DebounceTracker::new();
        let interval = Duration::seconds(3);

        assert!(debounce.should_emit(1, DetectionSubject::User(1), RuleType::Spam, t(0), interval));
        assert!(debounce.should_emit(1, DetectionSubject::User(2), RuleType::Spam, t(0), interval));
        assert!(debounce.should_emit(
            1,
            DetectionSubject::User(1),
            RuleType::ContentFilter,
            t(0),
            interval
        ));
        assert!(debounce.should_emit(2, DetectionSubject::User(1), RuleType::Spam, t(0), interval));
        assert!(debounce.should_emit(
            1,
            DetectionSubject::Guild,
            RuleType::RaidProtection,
            t(0),
            interval
        ));
    }

    #[test]
    fn suppressed_hits_do_not_extend_the_interval() {
        let debounce = DebounceTracker::new();
        let user = DetectionSubject::User(1);
        let interval = Duration::seconds(3);

        assert!(debounce.should_emit(1, user, RuleType::Spam, t(0), interval));
        assert!(!debounce.should_emit(1, user, RuleType::Spam, t(1), interval));
        assert!(!debounce.should_emit(1, user, RuleType::Spam, t(2), interval));
        assert!(debounce.should_emit(1, user, RuleType::Spam, t(3), interval));
    }

    #[test]
    fn sweep_and_forget_drop_state() {
        let debounce = DebounceTracker::new();
        let interval = Duration::seconds(3);
        debounce.should_emit(1, DetectionSubject::User(1), RuleType::Spam, t(0), interval);
        debounce.should_emit(2, DetectionSubject::User(1), RuleType::Spam, t(10), interval);

        assert_eq!(debounce.sweep(t(5), interval), 1);
        assert_eq!(debounce.sweep(t(5), interval), 0);

        debounce.forget_guild(2);
        assert!(debounce.should_emit(2, DetectionSubject::User(1), RuleType::Spam, t(11), interval));
    }

    #[test]
    fn released_emission_does_not_suppress() {
        let debounce = DebounceTracker::new();
        let user = DetectionSubject::User(1);
        let interval = Duration::seconds(3);

        assert!(debounce.should_emit(1, user, RuleType::Spam, t(0), interval));
        debounce.release(1, user, RuleType::Spam, t(0));
        assert!(debounce.should_emit(1, user, RuleType::Spam, t(1), interval));

        // Releasing a stale timestamp keeps the newer emission.
        debounce.release(1, user, RuleType::Spam, t(0));
        assert!(!debounce.should_emit(1, user, RuleType::Spam, t(2), interval));
    }
}
