// Discord layer - slash commands, gateway event intake and the REST gateway.
//
// Everything here is translation between serenity types and the core
// services. No moderation rules live in this layer.

#[path = "moderation/mod.rs"]
pub mod moderation;

use crate::core::analytics::AnalyticsAggregator;
use crate::core::annotations::{NoteService, TagService, WatchlistService};
use crate::core::moderation::guild_workers::GuildWorkerPool;
use crate::core::moderation::{
    CaseManager, DetectionPipeline, FlaggedEventStore, ModerationConfigService,
};
use crate::infra::annotations::SqliteAnnotationStore;
use crate::infra::moderation::SqliteModerationStore;
use moderation::discord_gateway::DiscordGateway;
use std::sync::Arc;

pub type Store = SqliteModerationStore;
pub type Annotations = SqliteAnnotationStore;
pub type Pipeline = DetectionPipeline<Store, DiscordGateway>;

/// Shared state handed to every command and event handler.
pub struct Data {
    pub config: Arc<ModerationConfigService<Store>>,
    pub cases: Arc<CaseManager<Store>>,
    pub flagged: Arc<FlaggedEventStore<Store>>,
    pub analytics: Arc<AnalyticsAggregator<Store>>,
    pub watchlist: Arc<WatchlistService<Annotations>>,
    pub tags: Arc<TagService<Annotations>>,
    pub notes: Arc<NoteService<Annotations>>,
    pub workers: Arc<GuildWorkerPool<Pipeline>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
