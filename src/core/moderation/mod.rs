// Core moderation module - detection, review workflow and case records.
// Pure domain logic; storage and Discord live behind the ports in
// moderation_store and auto_action.

pub mod audit;
pub mod auto_action;
pub mod case_manager;
pub mod config_service;
pub mod config_validation;
pub mod content_filter;
pub mod debounce;
pub mod detection_pipeline;
pub mod flagged_events;
pub mod guild_workers;
pub mod moderation_errors;
pub mod moderation_models;
pub mod moderation_store;
pub mod presets;
pub mod raid_detector;
pub mod spam_detector;

pub use audit::{AuditEvent, AuditLog};
pub use auto_action::{ActionOutcome, AutoActionExecutor, ModerationGateway, RetryPolicy};
pub use case_manager::CaseManager;
pub use config_service::ModerationConfigService;
pub use detection_pipeline::{DetectionPipeline, DetectorFailurePolicy, PipelineSettings};
pub use flagged_events::FlaggedEventStore;
pub use guild_workers::GuildWorkerPool;
pub use moderation_errors::{ActionError, ModerationError, StoreError};
pub use moderation_models::{
    AutoAction, CaseType, Evidence, EvidenceItem, FlaggedEvent, FlaggedEventStatus, GuildEvent,
    GuildModerationConfig, MemberJoined, MessageCreated, ModerationAction, ModerationCase,
    ModerationPreset, NewCase, NewFlaggedEvent, RuleType, Severity, StatusUpdate,
};
pub use moderation_store::{CaseRepository, ConfigRepository, FlaggedEventRepository};
