// Config-write validation. Anything rejected here never reaches a detector.

use super::moderation_errors::ValidationError;
use super::moderation_models::{
    AutoAction, ContentFilterConfig, GuildModerationConfig, RaidProtectionConfig,
    SpamDetectionConfig,
};

/// Discord caps member timeouts at 28 days.
pub const MAX_MUTE_SECS: u64 = 28 * 24 * 60 * 60;
/// Windows longer than a day are almost certainly a typo.
pub const MAX_WINDOW_SECONDS: u32 = 24 * 60 * 60;
pub const MAX_ACCOUNT_AGE_HOURS: u32 = 24 * 365;
pub const MAX_PROHIBITED_WORDS: usize = 500;

impl GuildModerationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.spam.validate()?;
        self.content_filter.validate()?;
        self.raid.validate()?;
        Ok(())
    }
}

impl SpamDetectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_window("spam.window_seconds", self.window_seconds)?;
        positive("spam.max_messages_per_window", u64::from(self.max_messages_per_window))?;

        let threshold = self.duplicate_message_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            // NaN fails the range check as well.
            return Err(ValidationError::OutOfUnitRange {
                field: "spam.duplicate_message_threshold",
                value: threshold,
            });
        }

        validate_action("spam.auto_action", &self.auto_action)
    }
}

impl ContentFilterConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prohibited_words.len() > MAX_PROHIBITED_WORDS {
            return Err(ValidationError::TooLarge {
                field: "content_filter.prohibited_words",
                value: self.prohibited_words.len() as u64,
                max: MAX_PROHIBITED_WORDS as u64,
            });
        }

        if let Some(index) = self
            .prohibited_words
            .iter()
            .position(|word| word.trim().is_empty())
        {
            return Err(ValidationError::BlankWord { index });
        }

        for domain in &self.allowed_link_domains {
            if !is_valid_domain(domain) {
                return Err(ValidationError::InvalidDomain(domain.clone()));
            }
        }

        validate_action("content_filter.auto_action", &self.auto_action)
    }
}

impl RaidProtectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_window("raid.window_seconds", self.window_seconds)?;
        positive("raid.max_joins_per_window", u64::from(self.max_joins_per_window))?;

        if self.min_account_age_hours > MAX_ACCOUNT_AGE_HOURS {
            return Err(ValidationError::TooLarge {
                field: "raid.min_account_age_hours",
                value: u64::from(self.min_account_age_hours),
                max: u64::from(MAX_ACCOUNT_AGE_HOURS),
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: u64) -> Result<(), ValidationError> {
    if value == 0 {
        Err(ValidationError::MustBePositive { field })
    } else {
        Ok(())
    }
}

fn validate_window(field: &'static str, seconds: u32) -> Result<(), ValidationError> {
    positive(field, u64::from(seconds))?;
    if seconds > MAX_WINDOW_SECONDS {
        return Err(ValidationError::TooLarge {
            field,
            value: u64::from(seconds),
            max: u64::from(MAX_WINDOW_SECONDS),
        });
    }
    Ok(())
}

fn validate_action(field: &'static str, action: &AutoAction) -> Result<(), ValidationError> {
    if let AutoAction::Mute { duration_secs } = action {
        positive(field, *duration_secs)?;
        if *duration_secs > MAX_MUTE_SECS {
            return Err(ValidationError::TooLarge {
                field,
                value: *duration_secs,
                max: MAX_MUTE_SECS,
            });
        }
    }
    Ok(())
}

/// Bare host names only: "example.com", not "https://example.com/path".
fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.trim();
    !domain.is_empty()
        && domain.len() <= 253
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::ModerationPreset;
    use chrono::Utc;

    fn config() -> GuildModerationConfig {
        GuildModerationConfig::from_preset(1, ModerationPreset::Moderate, Utc::now())
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut cfg = config();
        cfg.spam.window_seconds = 0;
        assert_eq!(
            cfg.validate(),
            Err(ValidationError::MustBePositive {
                field: "spam.window_seconds"
            })
        );

        let mut cfg = config();
        cfg.raid.window_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn threshold_outside_unit_range_is_rejected() {
        for bad in [-0.1, 1.01, f64::NAN] {
            let mut cfg = config();
            cfg.spam.duplicate_message_threshold = bad;
            assert!(
                matches!(cfg.validate(), Err(ValidationError::OutOfUnitRange { .. })),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn threshold_bounds_are_inclusive() {
        for ok in [0.0, 1.0] {
            let mut cfg = config();
            cfg.spam.duplicate_message_threshold = ok;
            assert!(cfg.validate().is_ok());
        }
    }

    #[test]
    fn blank_words_and_bad_domains_are_rejected() {
        let mut cfg = config();
        cfg.content_filter.prohibited_words = vec!["ok".into(), "  ".into()];
        assert_eq!(cfg.validate(), Err(ValidationError::BlankWord { index: 1 }));

        let mut cfg = config();
        cfg.content_filter.allowed_link_domains = vec!["https://example.com/x".into()];
        assert!(matches!(
            cfg.validate(),
            Err(ValidationError::InvalidDomain(_))
        ));
    }

    #[test]
    fn mute_duration_is_bounded() {
        let mut cfg = config();
        cfg.spam.auto_action = AutoAction::Mute { duration_secs: 0 };
        assert!(cfg.validate().is_err());

        cfg.spam.auto_action = AutoAction::Mute {
            duration_secs: MAX_MUTE_SECS + 1,
        };
        assert!(cfg.validate().is_err());

        cfg.spam.auto_action = AutoAction::Mute { duration_secs: 600 };
        assert!(cfg.validate().is_ok());
    }
}
