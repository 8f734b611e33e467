// Pre-baked rule sets for Simple mode.
//
// The numbers here are product decisions, not engine logic. The engine
// only requires that every preset passes validation.

use super::moderation_models::{
    AutoAction, ContentFilterConfig, GuildModerationConfig, ModerationMode, ModerationPreset,
    RaidAutoAction, RaidProtectionConfig, SpamDetectionConfig,
};
use chrono::{DateTime, Utc};

impl ModerationPreset {
    pub fn spam(&self) -> SpamDetectionConfig {
        match self {
            ModerationPreset::Relaxed => SpamDetectionConfig {
                enabled: true,
                max_messages_per_window: 10,
                window_seconds: 5,
                max_mentions_per_message: 15,
                duplicate_message_threshold: 0.95,
                auto_action: AutoAction::None,
            },
            ModerationPreset::Moderate => SpamDetectionConfig {
                enabled: true,
                max_messages_per_window: 5,
                window_seconds: 5,
                max_mentions_per_message: 10,
                duplicate_message_threshold: 0.9,
                auto_action: AutoAction::Delete,
            },
            ModerationPreset::Strict => SpamDetectionConfig {
                enabled: true,
                max_messages_per_window: 4,
                window_seconds: 6,
                max_mentions_per_message: 5,
                duplicate_message_threshold: 0.8,
                auto_action: AutoAction::Mute {
                    duration_secs: 10 * 60,
                },
            },
        }
    }

    pub fn content_filter(&self) -> ContentFilterConfig {
        match self {
            ModerationPreset::Relaxed => ContentFilterConfig {
                enabled: false,
                prohibited_words: Vec::new(),
                allowed_link_domains: Vec::new(),
                block_unlisted_links: false,
                block_invite_links: false,
                auto_action: AutoAction::None,
            },
            ModerationPreset::Moderate => ContentFilterConfig {
                enabled: true,
                prohibited_words: Vec::new(),
                allowed_link_domains: Vec::new(),
                block_unlisted_links: false,
                block_invite_links: true,
                auto_action: AutoAction::Delete,
            },
            ModerationPreset::Strict => ContentFilterConfig {
                enabled: true,
                prohibited_words: Vec::new(),
                allowed_link_domains: vec![
                    "youtube.com".to_string(),
                    "youtu.be".to_string(),
                    "github.com".to_string(),
                ],
                block_unlisted_links: true,
                block_invite_links: true,
                auto_action: AutoAction::Delete,
            },
        }
    }

    pub fn raid(&self) -> RaidProtectionConfig {
        match self {
            ModerationPreset::Relaxed => RaidProtectionConfig {
                enabled: true,
                max_joins_per_window: 20,
                window_seconds: 10,
                min_account_age_hours: 0,
                auto_action: RaidAutoAction::AlertOnly,
            },
            ModerationPreset::Moderate => RaidProtectionConfig {
                enabled: true,
                max_joins_per_window: 10,
                window_seconds: 10,
                min_account_age_hours: 24,
                auto_action: RaidAutoAction::AlertOnly,
            },
            ModerationPreset::Strict => RaidProtectionConfig {
                enabled: true,
                max_joins_per_window: 5,
                window_seconds: 10,
                min_account_age_hours: 72,
                auto_action: RaidAutoAction::LockInvites,
            },
        }
    }
}

impl GuildModerationConfig {
    /// Build a Simple-mode config for a guild from a preset.
    pub fn from_preset(guild_id: u64, preset: ModerationPreset, now: DateTime<Utc>) -> Self {
        Self {
            guild_id,
            mode: ModerationMode::Simple,
            simple_preset: Some(preset),
            spam: preset.spam(),
            content_filter: preset.content_filter(),
            raid: preset.raid(),
            alert_channel_id: None,
            updated_at: now,
        }
    }

    /// Config used for a guild that never saved one.
    pub fn default_for(guild_id: u64) -> Self {
        Self::from_preset(guild_id, ModerationPreset::Moderate, Utc::now())
    }

    /// Replace the rule sets with a preset's, keeping guild-specific
    /// settings like the word list and alert channel.
    pub fn apply_preset(&mut self, preset: ModerationPreset, now: DateTime<Utc>) {
        let words = std::mem::take(&mut self.content_filter.prohibited_words);
        self.spam = preset.spam();
        self.content_filter = preset.content_filter();
        self.content_filter.prohibited_words = words;
        self.raid = preset.raid();
        self.mode = ModerationMode::Simple;
        self.simple_preset = Some(preset);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_passes_validation() {
        for preset in [
            ModerationPreset::Relaxed,
            ModerationPreset::Moderate,
            ModerationPreset::Strict,
        ] {
            let config = GuildModerationConfig::from_preset(1, preset, Utc::now());
            assert!(config.validate().is_ok(), "{preset} failed validation");
        }
    }

    #[test]
    fn presets_get_stricter() {
        let relaxed = ModerationPreset::Relaxed.spam();
        let strict = ModerationPreset::Strict.spam();
        assert!(strict.max_messages_per_window < relaxed.max_messages_per_window);
        assert!(strict.max_mentions_per_message < relaxed.max_mentions_per_message);
        assert!(
            ModerationPreset::Strict.raid().max_joins_per_window
                < ModerationPreset::Relaxed.raid().max_joins_per_window
        );
    }

    #[test]
    fn apply_preset_keeps_word_list_and_alert_channel() {
        let mut config = GuildModerationConfig::from_preset(1, ModerationPreset::Relaxed, Utc::now());
        config.content_filter.prohibited_words = vec!["badword".to_string()];
        config.alert_channel_id = Some(42);
        config.mode = ModerationMode::Advanced;

        config.apply_preset(ModerationPreset::Strict, Utc::now());

        assert_eq!(config.mode, ModerationMode::Simple);
        assert_eq!(config.simple_preset, Some(ModerationPreset::Strict));
        assert_eq!(config.content_filter.prohibited_words, vec!["badword"]);
        assert!(config.content_filter.block_unlisted_links);
        assert_eq!(config.alert_channel_id, Some(42));
    }
}
