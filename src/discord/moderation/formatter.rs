// Embeds and text for moderation command replies.

use crate::core::moderation::{
    AutoAction, CaseType, EvidenceItem, FlaggedEvent, FlaggedEventStatus, GuildModerationConfig,
    ModerationCase, Severity,
};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

fn relative(at: DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

pub fn case_color(case_type: CaseType) -> u32 {
    match case_type {
        CaseType::Warn => 0xFFA500,
        CaseType::Mute => 0xFFD700,
        CaseType::Kick => 0xFF6347,
        CaseType::Ban => 0xB22222,
        CaseType::MessageDelete => 0x808080,
        CaseType::Note => 0x5865F2,
    }
}

fn severity_emoji(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "🟢",
        Severity::Medium => "🟡",
        Severity::High => "🟠",
        Severity::Critical => "🔴",
    }
}

fn status_emoji(status: FlaggedEventStatus) -> &'static str {
    match status {
        FlaggedEventStatus::Pending => "⏳",
        FlaggedEventStatus::Reviewed => "👀",
        FlaggedEventStatus::ActionTaken => "🔨",
        FlaggedEventStatus::Dismissed => "✖️",
    }
}

pub fn describe_evidence(item: &EvidenceItem) -> String {
    match item {
        EvidenceItem::RateExceeded {
            count,
            max,
            window_seconds,
        } => format!("{} messages in {}s (max {})", count, window_seconds, max),
        EvidenceItem::MentionsExceeded { count, max } => {
            format!("{} mentions (max {})", count, max)
        }
        EvidenceItem::DuplicateContent {
            similarity,
            threshold,
        } => format!(
            "{:.0}% similar to a recent message (threshold {:.0}%)",
            similarity * 100.0,
            threshold * 100.0
        ),
        EvidenceItem::ProhibitedWord { word } => format!("Prohibited word `{}`", word),
        EvidenceItem::UnlistedLink { domain } => format!("Link to unlisted domain `{}`", domain),
        EvidenceItem::InviteLink { code } => format!("Invite link `{}`", code),
        EvidenceItem::JoinSurge {
            count,
            max,
            window_seconds,
        } => format!("{} joins in {}s (max {})", count, window_seconds, max),
        EvidenceItem::YoungAccount {
            age_hours,
            min_hours,
        } => format!("Account is {}h old (minimum {}h)", age_hours, min_hours),
        EvidenceItem::DetectorFailure { detector, error } => {
            format!("{} detector failed: {}", detector, error)
        }
    }
}

pub fn case_embed(case: &ModerationCase) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Case #{} | {}", case.case_number, case.case_type))
        .color(case_color(case.case_type))
        .field("User", format!("<@{}>", case.target_user_id), true)
        .field("Moderator", format!("<@{}>", case.moderator_user_id), true)
        .field(
            "Reason",
            case.reason.as_deref().unwrap_or("No reason given"),
            false,
        )
        .field("Created", relative(case.created_at), true);

    if let Some(secs) = case.duration_secs {
        embed = embed.field("Duration", format!("{} minutes", secs / 60), true);
    }
    if let Some(expires_at) = case.expires_at {
        embed = embed.field("Expires", relative(expires_at), true);
    }
    if let Some(event_id) = case.related_flagged_event_id {
        embed = embed.field("Flagged event", format!("#{}", event_id), true);
    }
    if let (Some(by), Some(at)) = (case.reason_updated_by, case.reason_updated_at) {
        embed = embed.footer(serenity::CreateEmbedFooter::new(format!(
            "Reason edited by user {} at {}",
            by,
            at.format("%Y-%m-%d %H:%M UTC")
        )));
    }
    embed
}

/// One line per case for history listings.
pub fn case_line(case: &ModerationCase) -> String {
    format!(
        "`#{}` **{}** {} - {}",
        case.case_number,
        case.case_type,
        relative(case.created_at),
        case.reason.as_deref().unwrap_or("No reason given")
    )
}

pub fn flagged_line(event: &FlaggedEvent) -> String {
    format!(
        "{} `#{}` {} **{}** <@{}> {} - {}",
        status_emoji(event.status),
        event.id,
        severity_emoji(event.severity),
        event.rule_type,
        event.user_id,
        relative(event.created_at),
        event.description
    )
}

pub fn flagged_embed(event: &FlaggedEvent) -> serenity::CreateEmbed {
    let evidence = event
        .evidence
        .items
        .iter()
        .map(|item| format!("• {}", describe_evidence(item)))
        .collect::<Vec<_>>()
        .join("\n");

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Flagged event #{}", event.id))
        .description(&event.description)
        .color(0xFF8C00)
        .field("Rule", event.rule_type.to_string(), true)
        .field("Severity", event.severity.to_string(), true)
        .field("Status", event.status.to_string(), true)
        .field(
            "Evidence",
            if evidence.is_empty() {
                "None".to_string()
            } else {
                evidence
            },
            false,
        );

    if let Some(excerpt) = &event.evidence.content_excerpt {
        embed = embed.field("Content", format!("```{}```", excerpt.replace('`', "'")), false);
    }
    if let Some(action) = event.action_taken {
        embed = embed.field("Action", action.to_string(), true);
    }
    if let Some(reviewer) = event.reviewed_by_user_id {
        embed = embed.field("Reviewed by", format!("<@{}>", reviewer), true);
    }
    embed
}

fn action_text(action: AutoAction) -> String {
    match action {
        AutoAction::Mute { duration_secs } => format!("Mute {}m", duration_secs / 60),
        other => other.to_string(),
    }
}

pub fn config_embed(config: &GuildModerationConfig) -> serenity::CreateEmbed {
    let on_off = |enabled: bool| if enabled { "✅ Enabled" } else { "❌ Disabled" };

    let preset = match config.simple_preset {
        Some(preset) => format!("Preset: **{}**", preset),
        None => "Custom rules".to_string(),
    };

    serenity::CreateEmbed::new()
        .title("🛡️ AutoMod Status")
        .description(preset)
        .color(0x5865F2)
        .field(
            "Spam",
            format!(
                "{}\n{} msgs / {}s\n{} mentions max\nDuplicates at {:.0}%\nAction: {}",
                on_off(config.spam.enabled),
                config.spam.max_messages_per_window,
                config.spam.window_seconds,
                config.spam.max_mentions_per_message,
                config.spam.duplicate_message_threshold * 100.0,
                action_text(config.spam.auto_action)
            ),
            true,
        )
        .field(
            "Content Filter",
            format!(
                "{}\n{} prohibited words\n{} allowed domains\nUnlisted links: {}\nInvites: {}\nAction: {}",
                on_off(config.content_filter.enabled),
                config.content_filter.prohibited_words.len(),
                config.content_filter.allowed_link_domains.len(),
                if config.content_filter.block_unlisted_links { "blocked" } else { "allowed" },
                if config.content_filter.block_invite_links { "blocked" } else { "allowed" },
                action_text(config.content_filter.auto_action)
            ),
            true,
        )
        .field(
            "Raid Protection",
            format!(
                "{}\n{} joins / {}s\nMin account age: {}h\nAction: {}",
                on_off(config.raid.enabled),
                config.raid.max_joins_per_window,
                config.raid.window_seconds,
                config.raid.min_account_age_hours,
                config.raid.auto_action
            ),
            true,
        )
        .field(
            "Alert channel",
            config
                .alert_channel_id
                .map(|id| format!("<#{}>", id))
                .unwrap_or_else(|| "Not set".to_string()),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Last updated {}",
            config.updated_at.format("%Y-%m-%d %H:%M UTC")
        )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_reads_like_a_sentence() {
        assert_eq!(
            describe_evidence(&EvidenceItem::RateExceeded {
                count: 6,
                max: 5,
                window_seconds: 10
            }),
            "6 messages in 10s (max 5)"
        );
        assert_eq!(
            describe_evidence(&EvidenceItem::DuplicateContent {
                similarity: 0.95,
                threshold: 0.8
            }),
            "95% similar to a recent message (threshold 80%)"
        );
    }

    #[test]
    fn mute_action_shows_minutes() {
        assert_eq!(action_text(AutoAction::Mute { duration_secs: 600 }), "Mute 10m");
        assert_eq!(action_text(AutoAction::Delete), "Delete");
    }
}
