//! Cached entries and the aggregated error report

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::taxonomy::{ErrorContext, ReportableError};

pub const HOURLY_BUCKETS: usize = 24;
pub const DAILY_BUCKETS: usize = 7;
pub const WEEKLY_BUCKETS: usize = 4;

/// Per-entry occurrence timestamps kept for trend bucketing
pub const MAX_TRACKED_OCCURRENCES: usize = 256;

/// One deduplicated error in the reporter cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub fingerprint: String,
    pub error: ReportableError,
    pub occurrence_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Most recent occurrence times, oldest first
    #[serde(default)]
    pub seen_at: VecDeque<DateTime<Utc>>,
    /// Users seen across all occurrences
    #[serde(default)]
    pub users: BTreeSet<String>,
    /// Actions seen across all occurrences
    #[serde(default)]
    pub actions: BTreeSet<String>,
}

impl ErrorEntry {
    pub(crate) fn new(fingerprint: String, error: ReportableError, now: DateTime<Utc>) -> Self {
        let mut entry = Self {
            fingerprint,
            error,
            occurrence_count: 1,
            first_seen: now,
            last_seen: now,
            seen_at: VecDeque::from([now]),
            users: BTreeSet::new(),
            actions: BTreeSet::new(),
        };
        let context = entry.error.context.clone();
        entry.note_context(&context);
        entry
    }

    pub(crate) fn record_occurrence(&mut self, now: DateTime<Utc>, context: &ErrorContext) {
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        if now > self.last_seen {
            self.last_seen = now;
        }
        if self.seen_at.len() >= MAX_TRACKED_OCCURRENCES {
            self.seen_at.pop_front();
        }
        self.seen_at.push_back(now);
        self.note_context(context);
    }

    fn note_context(&mut self, context: &ErrorContext) {
        if let Some(user) = &context.user_id {
            self.users.insert(user.clone());
        }
        if let Some(action) = &context.action_name {
            self.actions.insert(action.clone());
        }
    }
}

/// Aggregate view over the reporter cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub generated_at: DateTime<Utc>,
    /// Distinct cached errors
    pub total_errors: usize,
    /// Sum of occurrence counts
    pub total_occurrences: u64,
    pub summary: ErrorSummary,
    pub trends: ErrorTrends,
    pub user_impact: UserImpact,
}

/// Occurrence counts grouped three ways
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub by_type: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_store: BTreeMap<String, u64>,
}

/// Histograms ordered oldest bucket first; the last bucket ends at report time
///
/// Each occurrence counts in the bucket of its own timestamp. Occurrences
/// older than the tracked window are attributed to the oldest tracked time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTrends {
    pub hourly: Vec<u64>,
    pub daily: Vec<u64>,
    pub weekly: Vec<u64>,
    pub top_errors: Vec<TopError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopError {
    pub fingerprint: String,
    pub category: String,
    pub message: String,
    pub occurrence_count: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserImpact {
    pub affected_users: usize,
    pub affected_actions: BTreeSet<String>,
}

impl ErrorReport {
    /// Build a report from cache entries as of `now`
    pub fn from_entries<'a, I>(entries: I, now: DateTime<Utc>, top_errors: usize) -> Self
    where
        I: IntoIterator<Item = &'a ErrorEntry>,
    {
        let mut summary = ErrorSummary::default();
        let mut hourly = vec![0; HOURLY_BUCKETS];
        let mut daily = vec![0; DAILY_BUCKETS];
        let mut weekly = vec![0; WEEKLY_BUCKETS];
        let mut users = BTreeSet::new();
        let mut actions = BTreeSet::new();
        let mut ranked = Vec::new();
        let mut total_errors = 0;
        let mut total_occurrences = 0;

        for entry in entries {
            let error = &entry.error;
            let count = entry.occurrence_count;
            total_errors += 1;
            total_occurrences += count;

            *summary
                .by_type
                .entry(error.category.as_str().to_string())
                .or_default() += count;
            *summary
                .by_severity
                .entry(error.severity.as_str().to_string())
                .or_default() += count;
            *summary
                .by_store
                .entry(error.context.store_or_default().to_string())
                .or_default() += count;

            let surplus = count.saturating_sub(entry.seen_at.len() as u64);
            let oldest = entry.seen_at.front().copied().unwrap_or(entry.last_seen);
            let timestamps = entry.seen_at.iter().map(|&at| (at, 1));
            for (at, weight) in timestamps.chain(std::iter::once((oldest, surplus))) {
                if weight == 0 {
                    continue;
                }
                let age = now.signed_duration_since(at);
                bucket(&mut hourly, age, ChronoDuration::hours(1), weight);
                bucket(&mut daily, age, ChronoDuration::days(1), weight);
                bucket(&mut weekly, age, ChronoDuration::weeks(1), weight);
            }

            users.extend(entry.users.iter().cloned());
            actions.extend(entry.actions.iter().cloned());

            ranked.push(TopError {
                fingerprint: entry.fingerprint.clone(),
                category: error.category.as_str().to_string(),
                message: error.message.clone(),
                occurrence_count: count,
                last_seen: entry.last_seen,
            });
        }

        ranked.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        ranked.truncate(top_errors);

        Self {
            generated_at: now,
            total_errors,
            total_occurrences,
            summary,
            trends: ErrorTrends {
                hourly,
                daily,
                weekly,
                top_errors: ranked,
            },
            user_impact: UserImpact {
                affected_users: users.len(),
                affected_actions: actions,
            },
        }
    }
}

/// Add `count` to the bucket `age` falls in; timestamps ahead of the report
/// land in the newest bucket, anything older than the window is skipped
fn bucket(buckets: &mut [u64], age: ChronoDuration, width: ChronoDuration, count: u64) {
    let age = age.max(ChronoDuration::zero());
    let index = (age.num_milliseconds() / width.num_milliseconds()) as usize;
    if index < buckets.len() {
        let last = buckets.len() - 1;
        buckets[last - index] += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{AppError, ErrorContext};
    use pretty_assertions::assert_eq;

    fn entry(error: AppError, count: u64, last_seen: DateTime<Utc>) -> ErrorEntry {
        let mut entry = ErrorEntry::new(error.error_id().to_string(), error.to_reportable(), last_seen);
        entry.occurrence_count = count;
        entry
    }

    #[test]
    fn test_buckets_by_last_seen() {
        let now = Utc::now();
        let ctx = ErrorContext::new();
        let entries = vec![
            entry(AppError::data("a", ctx.clone()), 2, now),
            entry(AppError::data("b", ctx.clone()), 1, now - ChronoDuration::minutes(90)),
            entry(AppError::data("c", ctx.clone()), 1, now - ChronoDuration::days(3)),
            entry(AppError::data("d", ctx.clone()), 1, now - ChronoDuration::weeks(10)),
        ];

        let report = ErrorReport::from_entries(&entries, now, 10);
        assert_eq!(report.trends.hourly[23], 2);
        assert_eq!(report.trends.hourly[22], 1);
        assert_eq!(report.trends.hourly.iter().sum::<u64>(), 3);
        assert_eq!(report.trends.daily[6], 3);
        assert_eq!(report.trends.daily[3], 1);
        assert_eq!(report.trends.weekly[3], 4);
        assert_eq!(report.trends.weekly.iter().sum::<u64>(), 4);
        assert_eq!(report.total_errors, 4);
        assert_eq!(report.total_occurrences, 5);
    }

    #[test]
    fn test_each_occurrence_lands_in_its_own_bucket() {
        let now = Utc::now();
        let ctx = ErrorContext::new();
        let three_days_ago = now - ChronoDuration::days(3);
        let mut entry = ErrorEntry::new(
            "fp".to_string(),
            AppError::data("flaky", ctx.clone()).to_reportable(),
            three_days_ago,
        );
        entry.record_occurrence(now, &ctx);

        let report = ErrorReport::from_entries([&entry], now, 10);
        assert_eq!(report.trends.daily[3], 1);
        assert_eq!(report.trends.daily[6], 1);
        assert_eq!(report.trends.hourly[23], 1);
        assert_eq!(report.trends.hourly.iter().sum::<u64>(), 1);
        assert_eq!(report.trends.weekly[3], 2);
    }

    #[test]
    fn test_tracked_occurrences_are_bounded() {
        let now = Utc::now();
        let ctx = ErrorContext::new();
        let start = now - ChronoDuration::days(2);
        let mut entry = ErrorEntry::new(
            "fp".to_string(),
            AppError::data("noisy", ctx.clone()).to_reportable(),
            start,
        );
        for _ in 0..MAX_TRACKED_OCCURRENCES + 10 {
            entry.record_occurrence(now, &ctx);
        }
        assert_eq!(entry.seen_at.len(), MAX_TRACKED_OCCURRENCES);

        let report = ErrorReport::from_entries([&entry], now, 10);
        assert_eq!(report.total_occurrences, MAX_TRACKED_OCCURRENCES as u64 + 11);
        assert_eq!(report.trends.daily.iter().sum::<u64>(), report.total_occurrences);
    }

    #[test]
    fn test_users_accumulate_across_occurrences() {
        let now = Utc::now();
        let first = ErrorContext::new().with_user("u1").with_action("load");
        let mut entry = ErrorEntry::new(
            "fp".to_string(),
            AppError::network(Some(503), "down", first).to_reportable(),
            now,
        );
        entry.record_occurrence(now, &ErrorContext::new().with_user("u2").with_action("load"));
        entry.record_occurrence(now, &ErrorContext::new().with_user("u3").with_action("save"));

        let report = ErrorReport::from_entries([&entry], now, 10);
        assert_eq!(report.user_impact.affected_users, 3);
        assert_eq!(report.user_impact.affected_actions.len(), 2);
    }

    #[test]
    fn test_top_errors_ranked_and_truncated() {
        let now = Utc::now();
        let ctx = ErrorContext::new();
        let entries = vec![
            entry(AppError::data("rare", ctx.clone()), 1, now),
            entry(AppError::data("common", ctx.clone()), 7, now),
            entry(AppError::data("middling", ctx.clone()), 3, now),
        ];

        let report = ErrorReport::from_entries(&entries, now, 2);
        let messages: Vec<_> = report
            .trends
            .top_errors
            .iter()
            .map(|top| top.message.as_str())
            .collect();
        assert_eq!(messages, vec!["common", "middling"]);
    }

    #[test]
    fn test_user_impact() {
        let now = Utc::now();
        let entries = vec![
            entry(
                AppError::data("a", ErrorContext::new().with_user("u1").with_action("load")),
                1,
                now,
            ),
            entry(
                AppError::data("b", ErrorContext::new().with_user("u1").with_action("save")),
                1,
                now,
            ),
            entry(
                AppError::data("c", ErrorContext::new().with_user("u2").with_action("load")),
                1,
                now,
            ),
        ];

        let report = ErrorReport::from_entries(&entries, now, 10);
        assert_eq!(report.user_impact.affected_users, 2);
        assert_eq!(
            report.user_impact.affected_actions.into_iter().collect::<Vec<_>>(),
            vec!["load".to_string(), "save".to_string()]
        );
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = ErrorReport::from_entries(std::iter::empty(), Utc::now(), 10);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("userImpact").is_some());
        assert!(json["trends"].get("topErrors").is_some());
        assert!(json["summary"].get("byType").is_some());
        assert_eq!(json["trends"]["hourly"].as_array().unwrap().len(), 24);
    }
}
