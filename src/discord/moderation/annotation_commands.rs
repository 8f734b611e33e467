// Moderator annotations: watchlist, private notes and user tags.
// None of this feeds back into detection.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

fn guild_id(ctx: Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}

/// Reply only the invoking moderator can see.
async fn private(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

// ============================================================================
// /watchlist
// ============================================================================

/// Keep an eye on specific users.
#[poise::command(
    slash_command,
    subcommands("watchlist_add", "watchlist_remove", "watchlist_list"),
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn watchlist(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a user to the watchlist, or update their reason.
#[poise::command(slash_command, guild_only, rename = "add")]
pub async fn watchlist_add(
    ctx: Context<'_>,
    #[description = "User to watch"] user: serenity::User,
    #[description = "Why they are being watched"] reason: String,
) -> Result<(), Error> {
    ctx.data()
        .watchlist
        .add(guild_id(ctx)?, user.id.get(), &reason, ctx.author().id.get())
        .await?;
    private(ctx, format!("👁️ <@{}> is on the watchlist.", user.id)).await
}

#[poise::command(slash_command, guild_only, rename = "remove")]
pub async fn watchlist_remove(
    ctx: Context<'_>,
    #[description = "User to stop watching"] user: serenity::User,
) -> Result<(), Error> {
    let removed = ctx
        .data()
        .watchlist
        .remove(guild_id(ctx)?, user.id.get())
        .await?;
    if removed {
        private(ctx, format!("✅ <@{}> removed from the watchlist.", user.id)).await
    } else {
        private(ctx, format!("<@{}> was not on the watchlist.", user.id)).await
    }
}

#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn watchlist_list(ctx: Context<'_>) -> Result<(), Error> {
    let entries = ctx.data().watchlist.list(guild_id(ctx)?).await?;
    if entries.is_empty() {
        return private(ctx, "The watchlist is empty.").await;
    }

    let lines = entries
        .iter()
        .map(|e| {
            format!(
                "<@{}> - {} (added by <@{}> <t:{}:R>)",
                e.user_id,
                e.reason,
                e.added_by,
                e.added_at.timestamp()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let embed = serenity::CreateEmbed::new()
        .title("👁️ Watchlist")
        .description(lines)
        .color(0x5865F2);
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

// ============================================================================
// /note
// ============================================================================

/// Private moderator notes on a user.
#[poise::command(
    slash_command,
    subcommands("note_add", "note_list", "note_delete"),
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn note(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

#[poise::command(slash_command, guild_only, rename = "add")]
pub async fn note_add(
    ctx: Context<'_>,
    #[description = "User the note is about"] user: serenity::User,
    #[description = "Note text"] content: String,
) -> Result<(), Error> {
    let note = ctx
        .data()
        .notes
        .add(guild_id(ctx)?, user.id.get(), ctx.author().id.get(), &content)
        .await?;
    private(ctx, format!("📝 Note #{} saved for <@{}>.", note.id, user.id)).await
}

#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn note_list(
    ctx: Context<'_>,
    #[description = "User to look up"] user: serenity::User,
) -> Result<(), Error> {
    let notes = ctx.data().notes.list(guild_id(ctx)?, user.id.get()).await?;
    if notes.is_empty() {
        return private(ctx, format!("No notes for <@{}>.", user.id)).await;
    }

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("📝 Notes for {}", user.name))
        .color(0x5865F2);
    for note in notes.iter().rev().take(25) {
        embed = embed.field(
            format!("#{} by {}", note.id, note.author_id),
            format!("{}\n<t:{}:R>", note.content, note.created_at.timestamp()),
            false,
        );
    }
    ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

#[poise::command(slash_command, guild_only, rename = "delete")]
pub async fn note_delete(
    ctx: Context<'_>,
    #[description = "Note id"] id: u64,
) -> Result<(), Error> {
    ctx.data().notes.delete(guild_id(ctx)?, id).await?;
    private(ctx, format!("🗑️ Note #{} deleted.", id)).await
}

// ============================================================================
// /tag
// ============================================================================

/// Short labels on users.
#[poise::command(
    slash_command,
    subcommands("tag_add", "tag_remove", "tag_list"),
    required_permissions = "MODERATE_MEMBERS",
    default_member_permissions = "MODERATE_MEMBERS",
    guild_only
)]
pub async fn tag(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

#[poise::command(slash_command, guild_only, rename = "add")]
pub async fn tag_add(
    ctx: Context<'_>,
    #[description = "User to tag"] user: serenity::User,
    #[description = "Tag (max 32 characters)"] tag: String,
) -> Result<(), Error> {
    let added = ctx
        .data()
        .tags
        .add(guild_id(ctx)?, user.id.get(), &tag, ctx.author().id.get())
        .await?;
    if added {
        private(ctx, format!("🏷️ Tagged <@{}>.", user.id)).await
    } else {
        private(ctx, format!("<@{}> already has that tag.", user.id)).await
    }
}

#[poise::command(slash_command, guild_only, rename = "remove")]
pub async fn tag_remove(
    ctx: Context<'_>,
    #[description = "User to untag"] user: serenity::User,
    #[description = "Tag to remove"] tag: String,
) -> Result<(), Error> {
    let removed = ctx
        .data()
        .tags
        .remove(guild_id(ctx)?, user.id.get(), &tag)
        .await?;
    if removed {
        private(ctx, format!("✅ Tag removed from <@{}>.", user.id)).await
    } else {
        private(ctx, format!("<@{}> did not have that tag.", user.id)).await
    }
}

#[poise::command(slash_command, guild_only, rename = "list")]
pub async fn tag_list(
    ctx: Context<'_>,
    #[description = "User to look up"] user: serenity::User,
) -> Result<(), Error> {
    let tags = ctx.data().tags.list(guild_id(ctx)?, user.id.get()).await?;
    if tags.is_empty() {
        return private(ctx, format!("<@{}> has no tags.", user.id)).await;
    }
    let list = tags
        .iter()
        .map(|t| format!("`{}`", t.tag))
        .collect::<Vec<_>>()
        .join(" ");
    private(ctx, format!("🏷️ <@{}>: {}", user.id, list)).await
}
