// Read-only moderation reporting, computed on demand from stored cases and
// flagged events.

use crate::core::moderation::{
    CaseRepository, CaseType, FlaggedEventRepository, FlaggedEventStatus, ModerationCase,
    RuleType, StoreError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatOffenderDto {
    pub user_id: u64,
    pub case_count: usize,
    pub last_case_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeratorWorkloadDto {
    pub moderator_user_id: u64,
    pub action_count: usize,
    pub share_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseTypeDistributionDto {
    pub case_type: CaseType,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCountDto {
    pub rule_type: RuleType,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlaggedEventSummaryDto {
    pub total: usize,
    pub pending: usize,
    pub reviewed: usize,
    pub action_taken: usize,
    pub dismissed: usize,
    pub by_rule: Vec<RuleCountDto>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 * 10_000.0 / total as f64).round() / 100.0
}

pub struct AnalyticsAggregator<S: CaseRepository + FlaggedEventRepository> {
    store: Arc<S>,
}

impl<S: CaseRepository + FlaggedEventRepository> AnalyticsAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Users with at least `threshold` punitive cases (notes excluded),
    /// most cases first. With `since`, older cases are not counted.
    pub async fn repeat_offenders(
        &self,
        guild_id: u64,
        threshold: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RepeatOffenderDto>, StoreError> {
        let cases = self.store.list_cases(guild_id).await?;

        let mut per_user: HashMap<u64, RepeatOffenderDto> = HashMap::new();
        let counted = cases.iter().filter(|c| {
            c.case_type != CaseType::Note && since.map_or(true, |since| c.created_at >= since)
        });
        for case in counted {
            let entry = per_user
                .entry(case.target_user_id)
                .or_insert_with(|| RepeatOffenderDto {
                    user_id: case.target_user_id,
                    case_count: 0,
                    last_case_at: case.created_at,
                });
            entry.case_count += 1;
            entry.last_case_at = entry.last_case_at.max(case.created_at);
        }

        let mut offenders: Vec<_> = per_user
            .into_values()
            .filter(|o| o.case_count >= threshold.max(1))
            .collect();
        offenders.sort_by(|a, b| {
            b.case_count
                .cmp(&a.case_count)
                .then_with(|| b.last_case_at.cmp(&a.last_case_at))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(offenders)
    }

    /// Cases per moderator, busiest first.
    pub async fn moderator_workload(&self, guild_id: u64) -> Result<Vec<ModeratorWorkloadDto>, StoreError> {
        let cases = self.store.list_cases(guild_id).await?;
        let total = cases.len();

        let mut counts: HashMap<u64, usize> = HashMap::new();
        for case in &cases {
            *counts.entry(case.moderator_user_id).or_default() += 1;
        }

        let mut workload: Vec<_> = counts
            .into_iter()
            .map(|(moderator_user_id, action_count)| ModeratorWorkloadDto {
                moderator_user_id,
                action_count,
                share_percent: percent(action_count, total),
            })
            .collect();
        workload.sort_by(|a, b| {
            b.action_count
                .cmp(&a.action_count)
                .then_with(|| a.moderator_user_id.cmp(&b.moderator_user_id))
        });
        Ok(workload)
    }

    /// Count of each case type that occurs in the guild.
    pub async fn case_type_distribution(
        &self,
        guild_id: u64,
    ) -> Result<Vec<CaseTypeDistributionDto>, StoreError> {
        let cases = self.store.list_cases(guild_id).await?;
        Ok(distribution(&cases))
    }

    pub async fn flagged_event_summary(&self, guild_id: u64) -> Result<FlaggedEventSummaryDto, StoreError> {
        let events = self
            .store
            .list_flagged_events(guild_id, None, usize::MAX)
            .await?;

        let mut summary = FlaggedEventSummaryDto {
            total: events.len(),
            ..Default::default()
        };
        let mut by_rule: HashMap<RuleType, usize> = HashMap::new();

        for event in &events {
            match event.status {
                FlaggedEventStatus::Pending => summary.pending += 1,
                FlaggedEventStatus::Reviewed => summary.reviewed += 1,
                FlaggedEventStatus::ActionTaken => summary.action_taken += 1,
                FlaggedEventStatus::Dismissed => summary.dismissed += 1,
            }
            *by_rule.entry(event.rule_type).or_default() += 1;
        }

        summary.by_rule = RuleType::ALL
            .iter()
            .filter_map(|rule| {
                by_rule.get(rule).map(|&count| RuleCountDto {
                    rule_type: *rule,
                    count,
                })
            })
            .collect();
        Ok(summary)
    }
}

fn distribution(cases: &[ModerationCase]) -> Vec<CaseTypeDistributionDto> {
    let total = cases.len();
    CaseType::ALL
        .iter()
        .filter_map(|case_type| {
            let count = cases.iter().filter(|c| c.case_type == *case_type).count();
            (count > 0).then(|| CaseTypeDistributionDto {
                case_type: *case_type,
                count,
                percentage: percent(count, total),
            })
        })
        .collect()
}
