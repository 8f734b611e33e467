// ModerationGateway backed by serenity's HTTP client.
//
// The engine only sees ActionOutcome / ActionError. HTTP 404 means the
// target is already gone, which counts as success.

use crate::core::moderation::{ActionError, ActionOutcome, ModerationGateway};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct DiscordGateway {
    http: Arc<serenity::Http>,
}

impl DiscordGateway {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

/// Sort a serenity error into retryable or not.
fn classify(error: serenity::Error) -> Result<ActionOutcome, ActionError> {
    match &error {
        serenity::Error::Http(http_error) => match http_error.status_code().map(|s| s.as_u16()) {
            Some(404) => Ok(ActionOutcome::AlreadySatisfied),
            Some(429) => Err(ActionError::Transient(error.to_string())),
            Some(code) if code >= 500 => Err(ActionError::Transient(error.to_string())),
            Some(_) => Err(ActionError::Permanent(error.to_string())),
            // No status at all: the request never got a response.
            None => Err(ActionError::Transient(error.to_string())),
        },
        serenity::Error::Io(_) => Err(ActionError::Transient(error.to_string())),
        _ => Err(ActionError::Permanent(error.to_string())),
    }
}

fn applied<T>(result: Result<T, serenity::Error>) -> Result<ActionOutcome, ActionError> {
    match result {
        Ok(_) => Ok(ActionOutcome::Applied),
        Err(e) => classify(e),
    }
}

#[async_trait]
impl ModerationGateway for DiscordGateway {
    async fn delete_message(
        &self,
        _guild_id: u64,
        channel_id: u64,
        message_id: u64,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError> {
        applied(
            self.http
                .delete_message(
                    serenity::ChannelId::new(channel_id),
                    serenity::MessageId::new(message_id),
                    Some(reason),
                )
                .await,
        )
    }

    async fn warn_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let guild_name = serenity::GuildId::new(guild_id)
            .to_partial_guild(&self.http)
            .await
            .map(|g| g.name)
            .unwrap_or_else(|_| "this server".to_string());

        let embed = serenity::CreateEmbed::new()
            .title("⚠️ Warning")
            .description(format!("You received a warning in **{}**.", guild_name))
            .field("Reason", reason, false)
            .color(0xFFA500);

        applied(
            serenity::UserId::new(user_id)
                .direct_message(&self.http, serenity::CreateMessage::new().embed(embed))
                .await,
        )
    }

    async fn timeout_user(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let until = serenity::Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| ActionError::Permanent(format!("Invalid timeout timestamp: {}", e)))?;

        applied(
            serenity::GuildId::new(guild_id)
                .edit_member(
                    &self.http,
                    serenity::UserId::new(user_id),
                    serenity::EditMember::new()
                        .disable_communication_until_datetime(until)
                        .audit_log_reason(reason),
                )
                .await,
        )
    }

    async fn kick_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError> {
        applied(
            serenity::GuildId::new(guild_id)
                .kick_with_reason(&self.http, serenity::UserId::new(user_id), reason)
                .await,
        )
    }

    async fn ban_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<ActionOutcome, ActionError> {
        applied(
            serenity::GuildId::new(guild_id)
                .ban_with_reason(&self.http, serenity::UserId::new(user_id), 0, reason)
                .await,
        )
    }

    async fn post_alert(
        &self,
        _guild_id: u64,
        channel_id: u64,
        message: &str,
    ) -> Result<ActionOutcome, ActionError> {
        let embed = serenity::CreateEmbed::new()
            .title("🛡️ AutoMod Alert")
            .description(message)
            .color(0xFF0000)
            .timestamp(serenity::Timestamp::now());

        let result = serenity::ChannelId::new(channel_id)
            .send_message(&self.http, serenity::CreateMessage::new().embed(embed))
            .await;

        // A deleted alert channel is a config problem, not a finished action.
        match result {
            Ok(_) => Ok(ActionOutcome::Applied),
            Err(e) => match classify(e) {
                Ok(ActionOutcome::AlreadySatisfied) => Err(ActionError::Permanent(format!(
                    "Alert channel {} not found",
                    channel_id
                ))),
                other => other,
            },
        }
    }

    async fn lock_invites(&self, guild_id: u64, reason: &str) -> Result<ActionOutcome, ActionError> {
        let invites = match serenity::GuildId::new(guild_id).invites(&self.http).await {
            Ok(invites) => invites,
            Err(e) => return classify(e),
        };

        if invites.is_empty() {
            return Ok(ActionOutcome::AlreadySatisfied);
        }

        let total = invites.len();
        for invite in invites {
            // An invite that vanished in the meantime is fine.
            if let Err(e) = self.http.delete_invite(&invite.code, Some(reason)).await {
                classify(e)?;
            }
        }

        tracing::info!(guild_id, revoked = total, "Invites revoked");
        Ok(ActionOutcome::Applied)
    }

    async fn lock_server(&self, guild_id: u64, reason: &str) -> Result<ActionOutcome, ActionError> {
        let guild_id = serenity::GuildId::new(guild_id);

        let guild = match guild_id.to_partial_guild(&self.http).await {
            Ok(guild) => guild,
            Err(e) => return classify(e),
        };
        if guild.verification_level == serenity::VerificationLevel::Higher {
            return Ok(ActionOutcome::AlreadySatisfied);
        }

        applied(
            guild_id
                .edit(
                    &self.http,
                    serenity::EditGuild::new()
                        .verification_level(serenity::VerificationLevel::Higher)
                        .audit_log_reason(reason),
                )
                .await,
        )
    }
}
