// Entry point of the AutoMod bot.
//
// **Architecture Overview:**
// - `core/` = Moderation engine (platform-agnostic)
// - `infra/` = Storage implementations of the core ports
// - `discord/` = Discord adapters (commands, gateway events, REST actions)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize stores and services (dependency injection)
// 3. Start the guild workers and background sweeper
// 4. Set up the Discord framework

#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;
mod settings;

use crate::core::analytics::AnalyticsAggregator;
use crate::core::annotations::{NoteService, TagService, WatchlistService};
use crate::core::moderation::config_validation::MAX_WINDOW_SECONDS;
use crate::core::moderation::{
    AuditEvent, AuditLog, AutoActionExecutor, CaseManager, DetectionPipeline, FlaggedEventStore,
    GuildWorkerPool, ModerationConfigService,
};
use crate::core::rate_window::RateWindowTracker;
use crate::discord::moderation::discord_gateway::DiscordGateway;
use crate::discord::moderation::{annotation_commands, commands, gateway_events};
use crate::discord::{Data, Error};
use crate::infra::annotations::SqliteAnnotationStore;
use crate::infra::moderation::SqliteModerationStore;
use crate::settings::EngineSettings;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Event handler for non-command Discord events.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            gateway_events::handle_message(data, new_message).await;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            gateway_events::handle_member_join(data, new_member).await;
        }
        serenity::FullEvent::GuildCreate { guild, .. } => {
            gateway_events::handle_guild_available(data, guild.id);
        }
        serenity::FullEvent::GuildDelete { incomplete, .. } => {
            gateway_events::handle_guild_removed(data, incomplete.id).await;
        }
        _ => {}
    }

    Ok(())
}

/// Write every audit event to the log. Stands in for a durable audit sink.
async fn log_audit_events(mut events: broadcast::Receiver<AuditEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(guild_id = event.guild_id(), audit = %payload, "AutoMod audit");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Audit logger fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").context(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    )?;
    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "data/automod.db".to_string());
    if let Some(parent) = std::path::Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    let settings = EngineSettings::from_env();
    tracing::info!(?settings, "Engine settings loaded");

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .context("Failed to connect to moderation DB")?;

    let store = Arc::new(SqliteModerationStore::new(pool.clone()));
    store
        .migrate()
        .await
        .context("Failed to migrate moderation DB")?;

    let annotation_store = Arc::new(SqliteAnnotationStore::new(pool));
    annotation_store
        .migrate()
        .await
        .context("Failed to migrate annotation tables")?;

    let audit = AuditLog::new();
    tokio::spawn(log_audit_events(audit.subscribe()));

    let config = Arc::new(ModerationConfigService::new(Arc::clone(&store)));
    let cases = Arc::new(CaseManager::new(Arc::clone(&store), audit.clone()));
    let flagged = Arc::new(FlaggedEventStore::new(
        Arc::clone(&store),
        Arc::clone(&cases),
        audit.clone(),
    ));
    let analytics = Arc::new(AnalyticsAggregator::new(Arc::clone(&store)));

    let http = Arc::new(serenity::Http::new(&token));
    let executor = AutoActionExecutor::new(
        Arc::clone(&store),
        Arc::new(DiscordGateway::new(http)),
        settings.retry(),
        audit.clone(),
    );

    let pipeline = Arc::new(DetectionPipeline::new(
        Arc::new(RateWindowTracker::new()),
        Arc::clone(&config),
        Arc::clone(&flagged),
        Arc::clone(&cases),
        executor,
        settings.pipeline(),
    ));
    let workers = Arc::new(GuildWorkerPool::new(
        Arc::clone(&pipeline),
        settings.queue_depth,
    ));

    // Idle state is only dropped once it is older than the longest window
    // any guild config can use.
    let sweeper = Arc::clone(&pipeline);
    let sweep_interval = settings.sweep_interval();
    tokio::spawn(async move {
        let retention = chrono::Duration::seconds(i64::from(MAX_WINDOW_SECONDS));
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweeper.sweep(chrono::Utc::now(), retention);
        }
    });

    let data = Data {
        config,
        cases,
        flagged,
        analytics,
        watchlist: Arc::new(WatchlistService::new(Arc::clone(&annotation_store))),
        tags: Arc::new(TagService::new(Arc::clone(&annotation_store))),
        notes: Arc::new(NoteService::new(annotation_store)),
        workers: Arc::clone(&workers),
    };

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::automod(),
                commands::case(),
                commands::flagged(),
                commands::modstats(),
                annotation_commands::watchlist(),
                annotation_commands::note(),
                annotation_commands::tag(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| {
                Box::pin(async move {
                    if let poise::FrameworkError::Command { error, ctx, .. } = error {
                        tracing::warn!(command = %ctx.command().qualified_name, error = %error, "Command failed");
                        let _ = ctx.say(format!("❌ {}", error)).await;
                    } else if let Err(e) = poise::builtins::on_error(error).await {
                        tracing::error!("Error while handling error: {}", e);
                    }
                })
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered, bot is ready");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .context("Failed to create Discord client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down, draining guild workers");
            workers.shutdown().await;
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Discord client stopped with an error")?;
    Ok(())
}
