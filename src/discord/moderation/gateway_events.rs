// Gateway events -> engine input events.
//
// Translation only. Each guild event is queued on that guild's worker;
// the worker pool decides ordering and backpressure.

use crate::core::moderation::{GuildEvent, MemberJoined, MessageCreated, ModerationError};
use crate::discord::Data;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

/// Build the engine event for a message. Bots, webhooks and DMs are skipped.
pub fn message_event(msg: &serenity::Message, now: DateTime<Utc>) -> Option<GuildEvent> {
    if msg.author.bot || msg.webhook_id.is_some() {
        return None;
    }
    let guild_id = msg.guild_id?;

    let mention_count =
        msg.mentions.len() + msg.mention_roles.len() + usize::from(msg.mention_everyone);

    Some(GuildEvent::Message(MessageCreated {
        guild_id: guild_id.get(),
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        author_id: msg.author.id.get(),
        content: msg.content.clone(),
        mention_count: u32::try_from(mention_count).unwrap_or(u32::MAX),
        timestamp: now,
    }))
}

pub fn join_event(member: &serenity::Member, now: DateTime<Utc>) -> Option<GuildEvent> {
    if member.user.bot {
        return None;
    }

    // The snowflake encodes creation time, so this never needs a fetch.
    let account_created_at =
        DateTime::from_timestamp(member.user.id.created_at().unix_timestamp(), 0)?;

    Some(GuildEvent::Join(MemberJoined {
        guild_id: member.guild_id.get(),
        user_id: member.user.id.get(),
        account_created_at,
        timestamp: now,
    }))
}

async fn submit(data: &Data, event: GuildEvent) {
    let guild_id = event.guild_id();
    match data.workers.submit(event).await {
        Ok(()) => {}
        Err(ModerationError::GuildDisconnected(_)) => {
            tracing::debug!(guild_id, "Dropped event for disconnected guild");
        }
        Err(e) => {
            tracing::warn!(guild_id, error = %e, "Failed to queue guild event");
        }
    }
}

pub async fn handle_message(data: &Data, msg: &serenity::Message) {
    if let Some(event) = message_event(msg, Utc::now()) {
        submit(data, event).await;
    }
}

pub async fn handle_member_join(data: &Data, member: &serenity::Member) {
    if let Some(event) = join_event(member, Utc::now()) {
        submit(data, event).await;
    }
}

/// The bot was removed from the guild or the guild went unavailable.
pub async fn handle_guild_removed(data: &Data, guild_id: serenity::GuildId) {
    tracing::info!(guild_id = guild_id.get(), "Guild unavailable, draining worker");
    data.workers.disconnect(guild_id.get()).await;
    data.config.invalidate(guild_id.get());
}

pub fn handle_guild_available(data: &Data, guild_id: serenity::GuildId) {
    if data.workers.is_disconnected(guild_id.get()) {
        tracing::info!(guild_id = guild_id.get(), "Guild available again");
        data.workers.reconnect(guild_id.get());
    }
}
