// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "rate_window/rate_window_tracker.rs"]
pub mod rate_window;

#[path = "similarity/similarity_scorer.rs"]
pub mod similarity;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "annotations/mod.rs"]
pub mod annotations;

#[path = "analytics/analytics_service.rs"]
pub mod analytics;
