// Sliding-window event counter used by the spam and raid detectors.
//
// State is sharded per guild: each guild owns its own map of subject keys,
// so two guilds never contend on the same lock and never see each other's
// counts. Within a guild, DashMap only locks the bucket holding the key.
//
// Nothing here is persisted. Losing it on restart is fine - live traffic
// rebuilds the counts within one window.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::fmt;

/// Hard cap on timestamps kept per key. A window can never report more
/// than this, which is far above any sane threshold.
pub const MAX_ENTRIES_PER_KEY: usize = 1_024;

/// What is being counted inside a guild.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    /// Messages sent by one user.
    User(u64),
    /// All member joins in the guild.
    Joins,
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectKey::User(id) => write!(f, "user:{}", id),
            SubjectKey::Joins => write!(f, "joins"),
        }
    }
}

type GuildShard = DashMap<SubjectKey, VecDeque<DateTime<Utc>>>;

/// Keyed sliding-window store. Passed around by `Arc` handle, never global.
#[derive(Default)]
pub struct RateWindowTracker {
    shards: DashMap<u64, GuildShard>,
}

impl RateWindowTracker {
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
        }
    }

    /// Record an event and return how many events (including this one) fall
    /// inside the trailing `window` ending at `timestamp`.
    pub fn record(
        &self,
        guild_id: u64,
        subject: SubjectKey,
        timestamp: DateTime<Utc>,
        window: Duration,
    ) -> usize {
        // The write guard from entry() is dropped at the end of the
        // statement, before the read guard below is taken.
        if !self.shards.contains_key(&guild_id) {
            self.shards.entry(guild_id).or_default();
        }

        let Some(shard) = self.shards.get(&guild_id) else {
            return 0;
        };

        let mut entries = shard.entry(subject).or_default();
        evict_expired(&mut entries, timestamp, window);

        // Events can arrive a few ms out of order; keep the deque sorted so
        // eviction from the front stays correct.
        let position = entries
            .iter()
            .rposition(|existing| *existing <= timestamp)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        entries.insert(position, timestamp);

        while entries.len() > MAX_ENTRIES_PER_KEY {
            entries.pop_front();
        }

        entries.len()
    }

    /// Count events in the window ending at `now` without recording one.
    #[cfg(test)]
    pub fn count(
        &self,
        guild_id: u64,
        subject: &SubjectKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> usize {
        let Some(shard) = self.shards.get(&guild_id) else {
            return 0;
        };
        let Some(mut entries) = shard.get_mut(subject) else {
            return 0;
        };
        evict_expired(&mut entries, now, window);
        entries.len()
    }

    /// Drop keys whose newest entry is older than `max_window`, and guild
    /// shards left empty. Returns the number of keys removed.
    pub fn sweep(&self, now: DateTime<Utc>, max_window: Duration) -> usize {
        let mut removed = 0;

        for shard in self.shards.iter() {
            let before = shard.len();
            shard.retain(|_, entries| {
                evict_expired(entries, now, max_window);
                !entries.is_empty()
            });
            removed += before - shard.len();
        }

        self.shards.retain(|_, shard| !shard.is_empty());
        removed
    }

    /// Forget everything about one guild (used when it disconnects).
    pub fn forget_guild(&self, guild_id: u64) {
        self.shards.remove(&guild_id);
    }

    /// Number of guilds currently holding state.
    #[cfg(test)]
    pub fn tracked_guilds(&self) -> usize {
        self.shards.len()
    }
}

/// An entry at `t` is inside the window when `now - t < window`.
fn evict_expired(entries: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while let Some(oldest) = entries.front() {
        if now.signed_duration_since(*oldest) >= window {
            entries.pop_front();
        } else {
            break;
        }
    }
}
