// Engine settings read from the environment (.env is loaded first in main).

use crate::core::moderation::guild_workers::DEFAULT_QUEUE_DEPTH;
use crate::core::moderation::{DetectorFailurePolicy, PipelineSettings, RetryPolicy};
use std::str::FromStr;
use std::time::Duration;

const MAX_DEBOUNCE_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub debounce_secs: i64,
    pub failure_policy: DetectorFailurePolicy,
    pub system_moderator_id: u64,
    pub queue_depth: usize,
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
    /// How often idle rate-window and debounce state is swept.
    pub sweep_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce_secs: 3,
            failure_policy: DetectorFailurePolicy::FailOpen,
            system_moderator_id: 0,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            retry_attempts: 3,
            retry_base_ms: 250,
            sweep_interval_secs: 60,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default and are logged.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            debounce_secs: parse_or(&lookup, "GUARDIAN_DEBOUNCE_SECS", defaults.debounce_secs)
                .clamp(0, MAX_DEBOUNCE_SECS),
            failure_policy: parse_or(
                &lookup,
                "GUARDIAN_DETECTOR_FAILURE_POLICY",
                defaults.failure_policy,
            ),
            system_moderator_id: parse_or(
                &lookup,
                "GUARDIAN_SYSTEM_MODERATOR_ID",
                defaults.system_moderator_id,
            ),
            queue_depth: parse_or(&lookup, "GUARDIAN_QUEUE_DEPTH", defaults.queue_depth).max(1),
            retry_attempts: parse_or(&lookup, "GUARDIAN_RETRY_ATTEMPTS", defaults.retry_attempts)
                .max(1),
            retry_base_ms: parse_or(&lookup, "GUARDIAN_RETRY_BASE_MS", defaults.retry_base_ms),
            sweep_interval_secs: parse_or(
                &lookup,
                "GUARDIAN_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )
            .max(1),
        }
    }

    pub fn pipeline(&self) -> PipelineSettings {
        PipelineSettings {
            debounce: chrono::Duration::seconds(self.debounce_secs.clamp(0, MAX_DEBOUNCE_SECS)),
            failure_policy: self.failure_policy,
            system_moderator_id: self.system_moderator_id,
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "Invalid setting, using default");
                default
            }
        },
        None => default,
    }
}
