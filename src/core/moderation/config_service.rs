// Per-guild moderation config: validated writes, cached reads.

use super::moderation_errors::{ModerationError, ValidationError};
use super::moderation_models::{GuildModerationConfig, ModerationMode, ModerationPreset, RuleType};
use super::moderation_store::ConfigRepository;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

pub struct ModerationConfigService<S: ConfigRepository> {
    store: Arc<S>,
    cache: DashMap<u64, Arc<GuildModerationConfig>>,
}

impl<S: ConfigRepository> ModerationConfigService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Current config for a guild. Guilds that never saved one get the
    /// Moderate preset.
    pub async fn get(&self, guild_id: u64) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        if let Some(cached) = self.cache.get(&guild_id) {
            return Ok(Arc::clone(&cached));
        }

        let config = match self.store.get_config(guild_id).await? {
            Some(config) => config,
            None => GuildModerationConfig::default_for(guild_id),
        };
        let config = Arc::new(config);
        self.cache.insert(guild_id, Arc::clone(&config));
        Ok(config)
    }

    /// Validate and persist a full config.
    pub async fn update(
        &self,
        guild_id: u64,
        mut config: GuildModerationConfig,
    ) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        if config.guild_id != guild_id {
            return Err(ValidationError::GuildMismatch {
                config: config.guild_id,
                expected: guild_id,
            }
            .into());
        }
        config.validate()?;
        config.updated_at = Utc::now();

        self.store.save_config(&config).await?;

        tracing::info!(guild_id, mode = ?config.mode, "Moderation config updated");

        let config = Arc::new(config);
        self.cache.insert(guild_id, Arc::clone(&config));
        Ok(config)
    }

    pub async fn apply_preset(
        &self,
        guild_id: u64,
        preset: ModerationPreset,
    ) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        let mut config = (*self.get(guild_id).await?).clone();
        config.apply_preset(preset, Utc::now());
        self.update(guild_id, config).await
    }

    /// Toggle a single rule. Editing individual rules leaves Simple mode.
    pub async fn set_rule_enabled(
        &self,
        guild_id: u64,
        rule: RuleType,
        enabled: bool,
    ) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        let mut config = (*self.get(guild_id).await?).clone();
        match rule {
            RuleType::Spam => config.spam.enabled = enabled,
            RuleType::ContentFilter => config.content_filter.enabled = enabled,
            RuleType::RaidProtection => config.raid.enabled = enabled,
        }
        config.mode = ModerationMode::Advanced;
        config.simple_preset = None;
        self.update(guild_id, config).await
    }

    pub async fn set_prohibited_words(
        &self,
        guild_id: u64,
        words: Vec<String>,
    ) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        let mut config = (*self.get(guild_id).await?).clone();
        config.content_filter.prohibited_words = words;
        self.update(guild_id, config).await
    }

    pub async fn set_alert_channel(
        &self,
        guild_id: u64,
        channel_id: Option<u64>,
    ) -> Result<Arc<GuildModerationConfig>, ModerationError> {
        let mut config = (*self.get(guild_id).await?).clone();
        config.alert_channel_id = channel_id;
        self.update(guild_id, config).await
    }

    /// Drop the cached copy so the next read goes to the store.
    pub fn invalidate(&self, guild_id: u64) {
        self.cache.remove(&guild_id);
    }
}
