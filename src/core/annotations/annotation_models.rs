// Moderator annotations on users. Informational only; detection never reads
// them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub guild_id: u64,
    pub user_id: u64,
    pub reason: String,
    pub added_by: u64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTag {
    pub guild_id: u64,
    pub user_id: u64,
    /// Lowercase, trimmed.
    pub tag: String,
    pub added_by: u64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModNote {
    pub id: u64,
    pub guild_id: u64,
    pub user_id: u64,
    pub author_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewModNote {
    pub guild_id: u64,
    pub user_id: u64,
    pub author_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
