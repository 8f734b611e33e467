// AutoMod slash commands: configuration, cases, flagged-event review and
// statistics. Thin wrappers around the core services.

use super::formatter::{case_embed, case_line, config_embed, flagged_embed, flagged_line};
use crate::core::moderation::config_validation::MAX_MUTE_SECS;
use crate::core::moderation::{AutoAction, FlaggedEventStatus, ModerationPreset, RuleType};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

const PENDING_PAGE: usize = 15;
const HISTORY_PAGE: usize = 20;
const REPEAT_OFFENDER_THRESHOLD: usize = 3;

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PresetChoice {
    Relaxed,
    Moderate,
    Strict,
}

impl From<PresetChoice> for ModerationPreset {
    fn from(value: PresetChoice) -> Self {
        match value {
            PresetChoice::Relaxed => ModerationPreset::Relaxed,
            PresetChoice::Moderate => ModerationPreset::Moderate,
            PresetChoice::Strict => ModerationPreset::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum RuleChoice {
    Spam,
    #[name = "Content Filter"]
    ContentFilter,
    #[name = "Raid Protection"]
    RaidProtection,
}

impl From<RuleChoice> for RuleType {
    fn from(value: RuleChoice) -> Self {
        match value {
            RuleChoice::Spam => RuleType::Spam,
            RuleChoice::ContentFilter => RuleType::ContentFilter,
            RuleChoice::RaidProtection => RuleType::RaidProtection,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum StatusChoice {
    Pending,
    Reviewed,
    #[name = "Action Taken"]
    ActionTaken,
    Dismissed,
}

impl From<StatusChoice> for FlaggedEventStatus {
    fn from(value: StatusChoice) -> Self {
        match value {
            StatusChoice::Pending => FlaggedEventStatus::Pending,
            StatusChoice::Reviewed => FlaggedEventStatus::Reviewed,
            StatusChoice::ActionTaken => FlaggedEventStatus::ActionTaken,
            StatusChoice::Dismissed => FlaggedEventStatus::Dismissed,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum ActionChoice {
    #[name = "Delete message"]
    Delete,
    Warn,
    Mute,
    Kick,
    Ban,
}

/// Map a command choice to an action. Mutes default to ten minutes and are
/// capped at Discord's 28 day timeout limit.
fn to_auto_action(choice: ActionChoice, mute_minutes: Option<u64>) -> AutoAction {
    match choice {
        ActionChoice::Delete => AutoAction::Delete,
        ActionChoice::Warn => AutoAction::Warn,
        ActionChoice::Mute => AutoAction::Mute {
            duration_secs: mute_minutes
                .unwrap_or(10)
                .max(1)
                .saturating_mul(60)
                .min(MAX_MUTE_SECS),
        },
        ActionChoice::Kick => AutoAction::Kick,
        ActionChoice::Ban => AutoAction::Ban,
    }
}

// ============================================================================
// /automod
// ============================================================================

/// AutoMod configuration.
#[poise::command(
    slash_command,
    subcommands("automod_status", "automod_preset", "automod_toggle", "automod_alerts", "automod_words"),
    required_permissions = "MANAGE_GUILD",
    default_member_permissions = "MANAGE_GUILD",
    guild_only
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current AutoMod rules.
#[poise::command(slash_command, guild_only, rename = "status")]
pub async fn automod_status(ctx: Context<'_>) -> Result<(), Error> {
    let config = ctx.data().config.get(guild_id(ctx)?).await?;
    ctx.send(poise::CreateReply::default().embed(config_embed(&config)))
        .await?;
    Ok(())
}

/// Replace every rule with a preset.
#[poise::command(
    slash_command,
    guild_only,
    rename = "preset",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn automod_preset(
    ctx: Context<'_>,
    #[description = "Preset to apply"] preset: PresetChoice,
) -> Result<(), Error> {
    let config = ctx
        .data()
        .config
        .apply_preset(guild_id(ctx)?, preset.into())
        .await?;
    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Applied the **{}** preset.", ModerationPreset::from(preset)))
            .embed(config_embed(&config)),
    )
    .await?;
    Ok(())
}

/// Turn a single rule on or off.
#[poise::command(
    slash_command,
    guild_only,
    rename = "toggle",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn automod_toggle(
    ctx: Context<'_>,
    #[description = "Rule to change"] rule: RuleChoice,
    #[description = "Enable or disable"] enabled: bool,
) -> Result<(), Error> {
    let rule = RuleType::from(rule);
    ctx.data()
        .config
        .set_rule_enabled(guild_id(ctx)?, rule, enabled)
        .await?;
    ctx.say(format!(
        "{} **{}** is now {}.",
        if enabled { "✅" } else { "❌" },
        rule,
        if enabled { "enabled" } else { "disabled" }
    ))
    .await?;
    Ok(())
}

/// Set or clear the channel for AutoMod alerts.
#[poise::command(
    slash_command,
    guild_only,
    rename = "alerts",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn automod_alerts(
    ctx: Context<'_>,
    #[description = "Alert channel (leave empty to clear)"]
    #[channel_types("Text")]
    channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let channel_id = channel.as_ref().map(|c| c.id.get());
    ctx.data()
        .config
        .set_alert_channel(guild_id(ctx)?, channel_id)
        .await?;

    match channel_id {
        Some(id) => ctx.say(format!("✅ AutoMod alerts will be posted in <#{}>.", id)).await?,
        None => ctx.say("✅ AutoMod alert channel cleared.").await?,
    };
    Ok(())
}

/// Replace the prohibited word list.
#[poise::command(
    slash_command,
    guild_only,
    rename = "words",
    required_permissions = "MANAGE_GUILD"
)]
pub async fn automod_words(
    ctx: Context<'_>,
    #[description = "Comma-separated words (empty clears the list)"] words: Option<String>,
) -> Result<(), Error> {
    let words: Vec<String> = words
        .unwrap_or_default()
        .split(',')
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect();
    let count = words.len();

    ctx.data()
        .config
        .set_prohibited_words(guild_id(ctx)?, words)
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content(format!("✅ Prohibited word list now has {} entries.", count))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

// ============================================================================
// /case
// ============================================================================

/// Moderation case records.
#[poise::command(
    slash_command,
    subcommands("case_view", "case_reason", "case_history", "case_recent"),
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn case(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show a case by number.
#[poise::command(slash_command, guild_only, rename = "view")]
pub async fn case_view(
    ctx: Context<'_>,
    #[description = "Case number"] number: u64,
) -> Result<(), Error> {
    match ctx.data().cases.get_case(guild_id(ctx)?, number).await? {
        Some(case) => {
            ctx.send(poise::CreateReply::default().embed(case_embed(&case)))
                .await?;
        }
        None => {
            ctx.say(format!("❌ Case #{} does not exist.", number)).await?;
        }
    }
    Ok(())
}

/// Change the reason on a case.
#[poise::command(slash_command, guild_only, rename = "reason")]
pub async fn case_reason(
    ctx: Context<'_>,
    #[description = "Case number"] number: u64,
    #[description = "New reason"] reason: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let Some(case) = data.cases.get_case(guild_id(ctx)?, number).await? else {
        ctx.say(format!("❌ Case #{} does not exist.", number)).await?;
        return Ok(());
    };

    let updated = data
        .cases
        .update_reason(case.id, &reason, ctx.author().id.get())
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content("✅ Reason updated.")
            .embed(case_embed(&updated)),
    )
    .await?;
    Ok(())
}

/// A user's case history.
#[poise::command(slash_command, guild_only, rename = "history")]
pub async fn case_history(
    ctx: Context<'_>,
    #[description = "User to look up"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let data = ctx.data();
    let history = data.cases.user_history(guild_id, user.id.get()).await?;
    let watched = data.watchlist.is_watched(guild_id, user.id.get()).await?;

    if history.is_empty() {
        ctx.say(format!("<@{}> has a clean record.", user.id)).await?;
        return Ok(());
    }

    let lines = history
        .iter()
        .rev()
        .take(HISTORY_PAGE)
        .map(case_line)
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title(format!("Cases for {}", user.name))
        .thumbnail(user.face())
        .description(lines)
        .color(0x5865F2)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} case(s) total{}",
            history.len(),
            if watched { " | on the watchlist" } else { "" }
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// The latest cases in this server.
#[poise::command(slash_command, guild_only, rename = "recent")]
pub async fn case_recent(ctx: Context<'_>) -> Result<(), Error> {
    let cases = ctx
        .data()
        .cases
        .recent_cases(guild_id(ctx)?, HISTORY_PAGE)
        .await?;

    if cases.is_empty() {
        ctx.say("No cases yet.").await?;
        return Ok(());
    }

    let lines = cases
        .iter()
        .map(|c| format!("{} <@{}>", case_line(c), c.target_user_id))
        .collect::<Vec<_>>()
        .join("\n");
    let embed = serenity::CreateEmbed::new()
        .title("Recent cases")
        .description(lines)
        .color(0x5865F2);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

// ============================================================================
// /flagged
// ============================================================================

/// Review flagged events.
#[poise::command(
    slash_command,
    subcommands(
        "flagged_pending",
        "flagged_list",
        "flagged_view",
        "flagged_review",
        "flagged_dismiss",
        "flagged_action"
    ),
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn flagged(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Events waiting for a decision, newest first.
#[poise::command(slash_command, guild_only, rename = "pending")]
pub async fn flagged_pending(ctx: Context<'_>) -> Result<(), Error> {
    let pending = ctx
        .data()
        .flagged
        .pending(guild_id(ctx)?, PENDING_PAGE)
        .await?;

    if pending.is_empty() {
        ctx.say("✅ Nothing waiting for review.").await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title("⏳ Pending flagged events")
        .description(pending.iter().map(flagged_line).collect::<Vec<_>>().join("\n"))
        .color(0xFF8C00);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Recent flagged events, optionally filtered by status.
#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn flagged_list(
    ctx: Context<'_>,
    #[description = "Only show events with this status"] status: Option<StatusChoice>,
) -> Result<(), Error> {
    let events = ctx
        .data()
        .flagged
        .list(guild_id(ctx)?, status.map(Into::into), PENDING_PAGE)
        .await?;

    if events.is_empty() {
        ctx.say("No flagged events found.").await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title("Flagged events")
        .description(events.iter().map(flagged_line).collect::<Vec<_>>().join("\n"))
        .color(0xFF8C00);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show a flagged event with its evidence.
#[poise::command(slash_command, guild_only, rename = "view")]
pub async fn flagged_view(
    ctx: Context<'_>,
    #[description = "Flagged event id"] id: u64,
) -> Result<(), Error> {
    let event = ctx.data().flagged.get_in_guild(guild_id(ctx)?, id).await?;
    ctx.send(poise::CreateReply::default().embed(flagged_embed(&event)))
        .await?;
    Ok(())
}

/// Mark an event as looked at without deciding.
#[poise::command(slash_command, guild_only, rename = "review")]
pub async fn flagged_review(
    ctx: Context<'_>,
    #[description = "Flagged event id"] id: u64,
) -> Result<(), Error> {
    let event = ctx
        .data()
        .flagged
        .review(guild_id(ctx)?, id, ctx.author().id.get())
        .await?;
    ctx.say(format!("👀 Flagged event #{} marked as reviewed.", event.id))
        .await?;
    Ok(())
}

/// Close an event as a false positive.
#[poise::command(slash_command, guild_only, rename = "dismiss")]
pub async fn flagged_dismiss(
    ctx: Context<'_>,
    #[description = "Flagged event id"] id: u64,
) -> Result<(), Error> {
    let event = ctx
        .data()
        .flagged
        .dismiss(guild_id(ctx)?, id, ctx.author().id.get())
        .await?;
    ctx.say(format!("✖️ Flagged event #{} dismissed.", event.id))
        .await?;
    Ok(())
}

/// Record an action against the flagged user and close the event.
#[poise::command(slash_command, guild_only, rename = "action")]
pub async fn flagged_action(
    ctx: Context<'_>,
    #[description = "Flagged event id"] id: u64,
    #[description = "Action taken"] action: ActionChoice,
    #[description = "Mute length in minutes (default: 10)"] mute_minutes: Option<u64>,
    #[description = "Reason (defaults to the detection summary)"] reason: Option<String>,
) -> Result<(), Error> {
    let (event, case) = ctx
        .data()
        .flagged
        .take_action(
            guild_id(ctx)?,
            id,
            ctx.author().id.get(),
            to_auto_action(action, mute_minutes),
            reason,
        )
        .await?;

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "🔨 Flagged event #{} closed with case #{}.",
                event.id, case.case_number
            ))
            .embed(case_embed(&case)),
    )
    .await?;
    Ok(())
}

// ============================================================================
// /modstats
// ============================================================================

/// Moderation statistics for this server.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn modstats(
    ctx: Context<'_>,
    #[description = "Only count repeat offenders from the last N days"]
    #[min = 1]
    #[max = 365]
    days: Option<u32>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let analytics = &ctx.data().analytics;
    let since = days.map(|d| chrono::Utc::now() - chrono::Duration::days(i64::from(d)));

    let summary = analytics.flagged_event_summary(guild_id).await?;
    let distribution = analytics.case_type_distribution(guild_id).await?;
    let offenders = analytics
        .repeat_offenders(guild_id, REPEAT_OFFENDER_THRESHOLD, since)
        .await?;
    let workload = analytics.moderator_workload(guild_id).await?;

    let or_none = |lines: Vec<String>| {
        if lines.is_empty() {
            "None".to_string()
        } else {
            lines.join("\n")
        }
    };

    let flagged = format!(
        "Total: **{}**\n⏳ Pending: {}\n👀 Reviewed: {}\n🔨 Actioned: {}\n✖️ Dismissed: {}",
        summary.total, summary.pending, summary.reviewed, summary.action_taken, summary.dismissed
    );
    let by_rule = or_none(
        summary
            .by_rule
            .iter()
            .map(|r| format!("{}: {}", r.rule_type, r.count))
            .collect(),
    );
    let cases = or_none(
        distribution
            .iter()
            .map(|d| format!("{}: {} ({:.2}%)", d.case_type, d.count, d.percentage))
            .collect(),
    );
    let offenders = or_none(
        offenders
            .iter()
            .take(10)
            .map(|o| format!("<@{}>: {} cases", o.user_id, o.case_count))
            .collect(),
    );
    let workload = or_none(
        workload
            .iter()
            .take(10)
            .map(|w| {
                format!(
                    "<@{}>: {} ({:.2}%)",
                    w.moderator_user_id, w.action_count, w.share_percent
                )
            })
            .collect(),
    );

    let embed = serenity::CreateEmbed::new()
        .title("📊 Moderation Stats")
        .color(0x5865F2)
        .field("Flagged events", flagged, true)
        .field("By rule", by_rule, true)
        .field("Cases", cases, false)
        .field(
            match days {
                Some(d) => format!("Repeat offenders ({}+ cases, last {} days)", REPEAT_OFFENDER_THRESHOLD, d),
                None => format!("Repeat offenders ({}+ cases)", REPEAT_OFFENDER_THRESHOLD),
            },
            offenders,
            true,
        )
        .field("Moderator workload", workload, true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_minutes_become_seconds() {
        assert_eq!(
            to_auto_action(ActionChoice::Mute, Some(5)),
            AutoAction::Mute { duration_secs: 300 }
        );
        assert_eq!(
            to_auto_action(ActionChoice::Mute, None),
            AutoAction::Mute { duration_secs: 600 }
        );
        assert_eq!(
            to_auto_action(ActionChoice::Mute, Some(u64::MAX)),
            AutoAction::Mute {
                duration_secs: MAX_MUTE_SECS
            }
        );
        assert_eq!(to_auto_action(ActionChoice::Kick, Some(5)), AutoAction::Kick);
    }
}
