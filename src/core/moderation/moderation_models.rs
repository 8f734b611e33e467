// Moderation domain models - configs, events, flagged events and cases.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts gateway payloads into the input events below
// and turns ModerationAction values back into REST calls.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ACTIONS
// ============================================================================

/// Automatic per-user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoAction {
    None,
    /// Delete the offending message.
    Delete,
    /// Send the user a warning.
    Warn,
    /// Discord timeout for the given duration.
    Mute { duration_secs: u64 },
    Kick,
    Ban,
}

impl AutoAction {
    pub fn is_none(&self) -> bool {
        matches!(self, AutoAction::None)
    }

    /// The case type recorded when this action is applied, if any.
    pub fn case_type(&self) -> Option<CaseType> {
        match self {
            AutoAction::None => None,
            AutoAction::Delete => Some(CaseType::MessageDelete),
            AutoAction::Warn => Some(CaseType::Warn),
            AutoAction::Mute { .. } => Some(CaseType::Mute),
            AutoAction::Kick => Some(CaseType::Kick),
            AutoAction::Ban => Some(CaseType::Ban),
        }
    }

    pub fn duration_secs(&self) -> Option<u64> {
        match self {
            AutoAction::Mute { duration_secs } => Some(*duration_secs),
            _ => None,
        }
    }
}

impl fmt::Display for AutoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoAction::None => write!(f, "None"),
            AutoAction::Delete => write!(f, "Delete"),
            AutoAction::Warn => write!(f, "Warn"),
            AutoAction::Mute { duration_secs } => write!(f, "Mute ({}s)", duration_secs),
            AutoAction::Kick => write!(f, "Kick"),
            AutoAction::Ban => write!(f, "Ban"),
        }
    }
}

/// Automatic guild-wide defensive action against a suspected raid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidAutoAction {
    None,
    /// Post an alert for moderators, change nothing.
    AlertOnly,
    /// Revoke existing invites so no new members can join.
    LockInvites,
    /// Raise the verification level to the maximum.
    LockServer,
}

impl RaidAutoAction {
    pub fn is_none(&self) -> bool {
        matches!(self, RaidAutoAction::None)
    }
}

impl fmt::Display for RaidAutoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaidAutoAction::None => write!(f, "None"),
            RaidAutoAction::AlertOnly => write!(f, "Alert Only"),
            RaidAutoAction::LockInvites => write!(f, "Lock Invites"),
            RaidAutoAction::LockServer => write!(f, "Lock Server"),
        }
    }
}

/// Either kind of action, as recommended by a detector or applied to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "action", rename_all = "snake_case")]
pub enum ModerationAction {
    User(AutoAction),
    Guild(RaidAutoAction),
}

impl ModerationAction {
    pub fn is_none(&self) -> bool {
        match self {
            ModerationAction::User(action) => action.is_none(),
            ModerationAction::Guild(action) => action.is_none(),
        }
    }
}

impl fmt::Display for ModerationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationAction::User(action) => write!(f, "{}", action),
            ModerationAction::Guild(action) => write!(f, "{}", action),
        }
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationMode {
    /// Settings come from a named preset.
    Simple,
    /// Settings were edited rule by rule.
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationPreset {
    Relaxed,
    Moderate,
    Strict,
}

impl fmt::Display for ModerationPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationPreset::Relaxed => write!(f, "Relaxed"),
            ModerationPreset::Moderate => write!(f, "Moderate"),
            ModerationPreset::Strict => write!(f, "Strict"),
        }
    }
}

impl FromStr for ModerationPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relaxed" => Ok(ModerationPreset::Relaxed),
            "moderate" => Ok(ModerationPreset::Moderate),
            "strict" => Ok(ModerationPreset::Strict),
            other => Err(format!("Unknown preset: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpamDetectionConfig {
    pub enabled: bool,
    pub max_messages_per_window: u32,
    pub window_seconds: u32,
    pub max_mentions_per_message: u32,
    /// Similarity in `[0, 1]` at or above which a message is a duplicate.
    pub duplicate_message_threshold: f64,
    pub auto_action: AutoAction,
}

impl SpamDetectionConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(i64::from(self.window_seconds))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFilterConfig {
    pub enabled: bool,
    pub prohibited_words: Vec<String>,
    pub allowed_link_domains: Vec<String>,
    pub block_unlisted_links: bool,
    pub block_invite_links: bool,
    pub auto_action: AutoAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidProtectionConfig {
    pub enabled: bool,
    pub max_joins_per_window: u32,
    pub window_seconds: u32,
    /// Accounts younger than this are flagged for review. 0 disables the check.
    pub min_account_age_hours: u32,
    pub auto_action: RaidAutoAction,
}

impl RaidProtectionConfig {
    pub fn window(&self) -> Duration {
        Duration::seconds(i64::from(self.window_seconds))
    }
}

/// Everything the engine needs to know about one guild's rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildModerationConfig {
    pub guild_id: u64,
    pub mode: ModerationMode,
    pub simple_preset: Option<ModerationPreset>,
    pub spam: SpamDetectionConfig,
    pub content_filter: ContentFilterConfig,
    pub raid: RaidProtectionConfig,
    /// Where raid alerts and auto-action failures are posted.
    pub alert_channel_id: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

/// Which rule a detection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Spam,
    ContentFilter,
    RaidProtection,
}

impl RuleType {
    pub const ALL: [RuleType; 3] = [
        RuleType::Spam,
        RuleType::ContentFilter,
        RuleType::RaidProtection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Spam => "spam",
            RuleType::ContentFilter => "content_filter",
            RuleType::RaidProtection => "raid_protection",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Spam => write!(f, "Spam"),
            RuleType::ContentFilter => write!(f, "Content Filter"),
            RuleType::RaidProtection => write!(f, "Raid Protection"),
        }
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(RuleType::Spam),
            "content_filter" => Ok(RuleType::ContentFilter),
            "raid_protection" => Ok(RuleType::RaidProtection),
            other => Err(format!("Unknown rule type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("Unknown severity: {}", other)),
        }
    }
}

// ============================================================================
// INPUT EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub content: String,
    pub mention_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberJoined {
    pub guild_id: u64,
    pub user_id: u64,
    pub account_created_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

impl MemberJoined {
    /// Whole hours between account creation and the join.
    pub fn account_age_hours(&self) -> i64 {
        self.timestamp
            .signed_duration_since(self.account_created_at)
            .num_hours()
    }
}

/// Anything the gateway hands to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuildEvent {
    Message(MessageCreated),
    Join(MemberJoined),
}

impl GuildEvent {
    pub fn guild_id(&self) -> u64 {
        match self {
            GuildEvent::Message(msg) => msg.guild_id,
            GuildEvent::Join(join) => join.guild_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            GuildEvent::Message(msg) => msg.timestamp,
            GuildEvent::Join(join) => join.timestamp,
        }
    }
}

// ============================================================================
// DETECTION
// ============================================================================

/// Maximum characters of message content kept as evidence.
pub const EVIDENCE_EXCERPT_CHARS: usize = 200;

/// One concrete reason a detector fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceItem {
    RateExceeded {
        count: usize,
        max: u32,
        window_seconds: u32,
    },
    MentionsExceeded {
        count: u32,
        max: u32,
    },
    DuplicateContent {
        similarity: f64,
        threshold: f64,
    },
    ProhibitedWord {
        word: String,
    },
    UnlistedLink {
        domain: String,
    },
    InviteLink {
        code: String,
    },
    JoinSurge {
        count: usize,
        max: u32,
        window_seconds: u32,
    },
    YoungAccount {
        age_hours: i64,
        min_hours: u32,
    },
    DetectorFailure {
        detector: String,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub items: Vec<EvidenceItem>,
    pub content_excerpt: Option<String>,
}

impl Evidence {
    pub fn new(items: Vec<EvidenceItem>) -> Self {
        Self {
            items,
            content_excerpt: None,
        }
    }

    /// Attach a truncated copy of the offending content.
    pub fn with_excerpt(mut self, content: &str) -> Self {
        if !content.trim().is_empty() {
            self.content_excerpt = Some(content.chars().take(EVIDENCE_EXCERPT_CHARS).collect());
        }
        self
    }
}

/// Who a detection is about. Guild-wide results debounce separately from
/// per-user ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionSubject {
    User(u64),
    Guild,
}

/// Output of one detector for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub rule_type: RuleType,
    pub severity: Severity,
    pub subject: DetectionSubject,
    pub user_id: u64,
    pub channel_id: Option<u64>,
    pub message_id: Option<u64>,
    pub description: String,
    pub evidence: Evidence,
    pub should_auto_action: bool,
    pub recommended_action: ModerationAction,
}

// ============================================================================
// FLAGGED EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlaggedEventStatus {
    Pending,
    Reviewed,
    ActionTaken,
    Dismissed,
}

impl FlaggedEventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlaggedEventStatus::ActionTaken | FlaggedEventStatus::Dismissed
        )
    }

    /// The review workflow only ever moves forward.
    pub fn can_transition_to(&self, next: FlaggedEventStatus) -> bool {
        use FlaggedEventStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Reviewed) | (_, ActionTaken) | (_, Dismissed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlaggedEventStatus::Pending => "pending",
            FlaggedEventStatus::Reviewed => "reviewed",
            FlaggedEventStatus::ActionTaken => "action_taken",
            FlaggedEventStatus::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for FlaggedEventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlaggedEventStatus::Pending => write!(f, "Pending"),
            FlaggedEventStatus::Reviewed => write!(f, "Reviewed"),
            FlaggedEventStatus::ActionTaken => write!(f, "Action Taken"),
            FlaggedEventStatus::Dismissed => write!(f, "Dismissed"),
        }
    }
}

impl FromStr for FlaggedEventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FlaggedEventStatus::Pending),
            "reviewed" => Ok(FlaggedEventStatus::Reviewed),
            "action_taken" => Ok(FlaggedEventStatus::ActionTaken),
            "dismissed" => Ok(FlaggedEventStatus::Dismissed),
            other => Err(format!("Unknown flagged event status: {}", other)),
        }
    }
}

/// Append-only audit record of a detected violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedEvent {
    pub id: u64,
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: Option<u64>,
    pub message_id: Option<u64>,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub description: String,
    pub evidence: Evidence,
    pub status: FlaggedEventStatus,
    pub action_taken: Option<ModerationAction>,
    pub reviewed_by_user_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Set once the automatic action has been claimed for execution.
    pub auto_action_applied: bool,
}

/// Insert payload for a new flagged event. Status always starts Pending.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFlaggedEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub channel_id: Option<u64>,
    pub message_id: Option<u64>,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub description: String,
    pub evidence: Evidence,
    pub created_at: DateTime<Utc>,
}

impl NewFlaggedEvent {
    pub fn from_detection(guild_id: u64, result: &DetectionResult, now: DateTime<Utc>) -> Self {
        Self {
            guild_id,
            user_id: result.user_id,
            channel_id: result.channel_id,
            message_id: result.message_id,
            rule_type: result.rule_type,
            severity: result.severity,
            description: result.description.clone(),
            evidence: result.evidence.clone(),
            created_at: now,
        }
    }
}

/// The fields written by a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: FlaggedEventStatus,
    pub action_taken: Option<ModerationAction>,
    pub reviewed_by_user_id: Option<u64>,
    pub reviewed_at: DateTime<Utc>,
}

// ============================================================================
// CASES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseType {
    Warn,
    Mute,
    Kick,
    Ban,
    MessageDelete,
    Note,
}

impl CaseType {
    pub const ALL: [CaseType; 6] = [
        CaseType::Warn,
        CaseType::Mute,
        CaseType::Kick,
        CaseType::Ban,
        CaseType::MessageDelete,
        CaseType::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Warn => "warn",
            CaseType::Mute => "mute",
            CaseType::Kick => "kick",
            CaseType::Ban => "ban",
            CaseType::MessageDelete => "message_delete",
            CaseType::Note => "note",
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseType::Warn => write!(f, "Warn"),
            CaseType::Mute => write!(f, "Mute"),
            CaseType::Kick => write!(f, "Kick"),
            CaseType::Ban => write!(f, "Ban"),
            CaseType::MessageDelete => write!(f, "Message Delete"),
            CaseType::Note => write!(f, "Note"),
        }
    }
}

impl FromStr for CaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warn" => Ok(CaseType::Warn),
            "mute" => Ok(CaseType::Mute),
            "kick" => Ok(CaseType::Kick),
            "ban" => Ok(CaseType::Ban),
            "message_delete" => Ok(CaseType::MessageDelete),
            "note" => Ok(CaseType::Note),
            other => Err(format!("Unknown case type: {}", other)),
        }
    }
}

/// Durable record of an action against a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationCase {
    pub id: u64,
    /// Per-guild, starts at 1, no gaps, never reused.
    pub case_number: u64,
    pub guild_id: u64,
    pub target_user_id: u64,
    pub moderator_user_id: u64,
    pub case_type: CaseType,
    pub reason: Option<String>,
    pub duration_secs: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub related_flagged_event_id: Option<u64>,
    pub reason_updated_by: Option<u64>,
    pub reason_updated_at: Option<DateTime<Utc>>,
}

/// Create-case payload. The store assigns `id` and `case_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCase {
    pub guild_id: u64,
    pub target_user_id: u64,
    pub moderator_user_id: u64,
    pub case_type: CaseType,
    pub reason: Option<String>,
    pub duration_secs: Option<u64>,
    pub related_flagged_event_id: Option<u64>,
}

impl NewCase {
    pub fn expires_at(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.duration_secs?).ok()?;
        created_at.checked_add_signed(Duration::try_seconds(secs)?)
    }
}
