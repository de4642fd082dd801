use crate::analyze::model::describe_due;
use crate::analyze::{EvidenceItem, EvidenceReason};
use crate::model::{EvidenceConfig, MetricsCollection, TimeInStatus, WorkItem, WorkItemSet, WorkStatus};
use chrono::{DateTime, Duration, FixedOffset};
use itertools::Itertools;
use std::cmp::Ordering;
use tracing::debug;

/// Picks the most concerning work items, each with the first reason rule it
/// matches.
#[derive(Debug, Clone, Default)]
pub struct EvidenceRanker {
    config: EvidenceConfig,
}

impl EvidenceRanker {
    pub fn new(config: EvidenceConfig) -> Self {
        Self { config }
    }

    /// At most `top_n` items, no key twice. Without the time-in-status metric
    /// only the rules that do not need staleness can match.
    pub fn rank(
        &self,
        items: &WorkItemSet,
        metrics: &MetricsCollection,
        now: &DateTime<FixedOffset>,
    ) -> Vec<EvidenceItem> {
        let times = metrics.time_in_status();
        let evidence: Vec<_> = items
            .all_items()
            .filter_map(|item| self.evaluate(item, staleness(item, times, now), now))
            // subtasks come before their parent, so a shared key keeps the subtask
            .unique_by(|e| e.key.clone())
            .sorted_by(rank_order)
            .take(self.config.top_n)
            .collect();

        debug!(
            evidence = evidence.len(),
            staleness_known = times.is_some(),
            "evidence ranked"
        );
        evidence
    }

    fn evaluate(
        &self,
        item: &WorkItem,
        staleness: Option<Duration>,
        now: &DateTime<FixedOffset>,
    ) -> Option<EvidenceItem> {
        let stale = staleness.is_some_and(|s| s > self.config.stale_after());
        let aborted_unassigned = item.status == WorkStatus::Aborted && item.is_unassigned();
        let candidate = !item.status.is_terminal() || item.reopened || stale || aborted_unassigned;
        if !candidate {
            return None;
        }

        let reason = self.reason(item, staleness, now)?;
        let mut justification = reason.describe(staleness);
        if let Some(due) = item.due {
            justification = format!("{justification}, {}", describe_due(due, now.date_naive()));
        }
        Some(EvidenceItem {
            key: item.key.clone(),
            title: item.title.clone(),
            status: item.status,
            assignee: item.assignee.clone().filter(|_| !item.is_unassigned()),
            staleness,
            reason,
            justification,
            due: item.due,
        })
    }

    fn reason(
        &self,
        item: &WorkItem,
        staleness: Option<Duration>,
        now: &DateTime<FixedOffset>,
    ) -> Option<EvidenceReason> {
        let beyond = |threshold: Duration| staleness.is_some_and(|s| s > threshold);
        let unassigned = item.is_unassigned();

        if item.status == WorkStatus::Reviewing && beyond(self.config.review_stale_after()) {
            Some(EvidenceReason::StaleInReview)
        } else if beyond(self.config.stale_after()) && unassigned {
            Some(EvidenceReason::StaleUnassigned)
        } else if beyond(self.config.stale_after()) {
            Some(EvidenceReason::StaleAssigned)
        } else if item.blocked {
            Some(EvidenceReason::Blocked)
        } else if item.reopened {
            Some(EvidenceReason::Reopened)
        } else if item.status == WorkStatus::Aborted && unassigned {
            Some(EvidenceReason::AbortedUnassigned)
        } else if unassigned && now.signed_duration_since(item.created) <= self.config.recent_window() {
            Some(EvidenceReason::NewUnassigned)
        } else {
            None
        }
    }
}

/// Time in the current status. Taken from the metric, falling back to the
/// item's own timestamp when the metric has no entry for it; unknown when the
/// metric is unavailable.
fn staleness(
    item: &WorkItem,
    times: Option<&TimeInStatus>,
    now: &DateTime<FixedOffset>,
) -> Option<Duration> {
    if item.status.is_terminal() {
        return None;
    }
    let times = times?;
    times
        .current_for(&item.key)
        .and_then(|entry| entry.current)
        .or_else(|| item.time_in_current_status(now))
}

// Most stale first, unknown staleness last; then unassigned first; then key.
fn rank_order(a: &EvidenceItem, b: &EvidenceItem) -> Ordering {
    b.staleness
        .cmp(&a.staleness)
        .then_with(|| a.assignee.is_some().cmp(&b.assignee.is_some()))
        .then_with(|| a.key.cmp(&b.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemStatusTimes, Metric, MetricKind, MetricValue, ParentItem};
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-10T09:00:00+09:00").unwrap()
    }

    fn item(key: &str, status: WorkStatus, days_in_status: i64) -> WorkItem {
        let entered = now() - Duration::days(days_in_status);
        WorkItem::new(key, format!("Task {key}"), status, entered - Duration::days(1))
            .with_status_entered(entered)
    }

    fn single(items: Vec<WorkItem>) -> WorkItemSet {
        WorkItemSet::new(items.into_iter().map(|i| ParentItem::new(i, vec![])).collect()).unwrap()
    }

    fn with_time_in_status(times: TimeInStatus) -> MetricsCollection {
        let mut values = IndexMap::new();
        values.insert(MetricKind::TimeInStatus, MetricValue::Present(Metric::TimeInStatus(times)));
        MetricsCollection::new(values)
    }

    fn keys(evidence: &[EvidenceItem]) -> Vec<&str> {
        evidence.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn week_in_review_is_review_staleness() {
        let items = single(vec![item("S-1", WorkStatus::Reviewing, 7).with_assignee("alice")]);
        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus::default()), &now());

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].reason, EvidenceReason::StaleInReview);
        assert_eq!(evidence[0].staleness, Some(Duration::days(7)));
        assert_eq!(evidence[0].justification, "in review for 7.0 days without progress");
    }

    #[test]
    fn justification_carries_due_date() {
        let items = single(vec![
            item("S-1", WorkStatus::Reviewing, 7)
                .with_assignee("alice")
                .with_due(NaiveDate::from_ymd_opt(2024, 5, 9).unwrap()),
            item("S-2", WorkStatus::InProgress, 0)
                .blocked()
                .with_assignee("bob")
                .with_due(NaiveDate::from_ymd_opt(2024, 5, 12).unwrap()),
        ]);
        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus::default()), &now());

        assert_eq!(keys(&evidence), vec!["S-1", "S-2"]);
        assert_eq!(
            evidence[0].justification,
            "in review for 7.0 days without progress, overdue by 1 day"
        );
        assert_eq!(evidence[1].justification, "blocked, due in 2 days");
        assert_eq!(evidence[1].due, NaiveDate::from_ymd_opt(2024, 5, 12));
    }

    #[test]
    fn metric_entry_takes_precedence_over_item_timestamp() {
        let items = single(vec![item("S-1", WorkStatus::InProgress, 1).with_assignee("alice")]);
        let mut per_item = IndexMap::new();
        per_item.insert(
            "S-1".to_string(),
            ItemStatusTimes {
                current_status: WorkStatus::InProgress,
                current: Some(Duration::days(4)),
                by_status: IndexMap::new(),
            },
        );
        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus { per_item }), &now());
        assert_eq!(evidence[0].reason, EvidenceReason::StaleAssigned);
        assert_eq!(evidence[0].staleness, Some(Duration::days(4)));
    }

    #[test]
    fn unavailable_time_in_status_keeps_non_staleness_rules() {
        let items = single(vec![
            item("S-1", WorkStatus::Reviewing, 9).with_assignee("alice"),
            item("S-2", WorkStatus::InProgress, 9).with_assignee("bob").blocked(),
            item("S-3", WorkStatus::Done, 9).with_assignee("carol").reopened(),
            item("S-4", WorkStatus::Aborted, 9),
            item("S-5", WorkStatus::Done, 9).with_assignee("dave"),
        ]);
        let evidence = EvidenceRanker::default().rank(&items, &MetricsCollection::all_unavailable("offline"), &now());

        let reasons: Vec<_> = evidence.iter().map(|e| (e.key.as_str(), e.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                ("S-4", EvidenceReason::AbortedUnassigned),
                ("S-2", EvidenceReason::Blocked),
                ("S-3", EvidenceReason::Reopened),
            ]
        );
        assert!(evidence.iter().all(|e| e.staleness.is_none()));
    }

    #[test]
    fn new_unassigned_items_are_flagged() {
        let items = single(vec![
            item("S-1", WorkStatus::ToDo, 0),
            item("S-2", WorkStatus::ToDo, 0).with_assignee("bob"),
        ]);
        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus::default()), &now());
        assert_eq!(keys(&evidence), vec!["S-1"]);
        assert_eq!(evidence[0].reason, EvidenceReason::NewUnassigned);
    }

    #[test]
    fn subtask_wins_over_parent_with_same_key() {
        let parent = item("P-1", WorkStatus::InProgress, 10).with_assignee("alice");
        let mut subtask = item("P-1", WorkStatus::Reviewing, 3).with_assignee("bob");
        subtask.title = "Subtask of P-1".to_string();
        let items = WorkItemSet::new(vec![ParentItem::new(parent, vec![subtask])]).unwrap();

        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus::default()), &now());
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].title, "Subtask of P-1");
        assert_eq!(evidence[0].reason, EvidenceReason::StaleInReview);
    }

    #[test]
    fn orders_by_staleness_then_assignee_then_key_and_truncates() {
        let items = single(vec![
            item("S-7", WorkStatus::InProgress, 3).with_assignee("a"),
            item("S-2", WorkStatus::InProgress, 5).with_assignee("a"),
            item("S-9", WorkStatus::InProgress, 5),
            item("S-1", WorkStatus::InProgress, 5).with_assignee("a"),
            item("S-4", WorkStatus::InProgress, 8).with_assignee("a"),
            item("S-3", WorkStatus::InProgress, 4).with_assignee("a"),
            item("S-8", WorkStatus::InProgress, 6).with_assignee("a"),
        ]);
        let evidence = EvidenceRanker::default().rank(&items, &with_time_in_status(TimeInStatus::default()), &now());

        assert_eq!(keys(&evidence), vec!["S-4", "S-8", "S-9", "S-1", "S-2"]);
        assert_eq!(evidence[2].reason, EvidenceReason::StaleUnassigned);
    }

    #[test]
    fn empty_set_yields_no_evidence() {
        let metrics = MetricsCollection::all_unavailable("offline");
        let evidence = EvidenceRanker::default().rank(&WorkItemSet::empty(), &metrics, &now());
        assert!(evidence.is_empty());
    }

    fn status_strategy() -> impl Strategy<Value = WorkStatus> {
        prop::sample::select(WorkStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn evidence_is_bounded_and_unique(
            shape in prop::collection::vec(
                (
                    status_strategy(),
                    0i64..10,
                    any::<bool>(),
                    any::<bool>(),
                    prop::collection::vec((status_strategy(), 0i64..10, any::<bool>()), 0..4),
                ),
                0..10,
            ),
            top_n in 1usize..8,
            metric_available in any::<bool>(),
        ) {
            let parents = shape
                .into_iter()
                .enumerate()
                .map(|(p, (status, days, blocked, reopened, subs))| {
                    let mut parent = item(&format!("P-{p}"), status, days);
                    parent.blocked = blocked;
                    parent.reopened = reopened;
                    let subtasks = subs
                        .into_iter()
                        .enumerate()
                        .map(|(s, (status, days, assigned))| {
                            // every other parent reuses its key for the first subtask
                            let key = if s == 0 && p % 2 == 0 { format!("P-{p}") } else { format!("S-{p}-{s}") };
                            let sub = item(&key, status, days);
                            if assigned { sub.with_assignee("someone") } else { sub }
                        })
                        .collect();
                    ParentItem::new(parent, subtasks)
                })
                .collect();
            let items = WorkItemSet::new(parents).unwrap();
            let metrics = if metric_available {
                with_time_in_status(TimeInStatus::default())
            } else {
                MetricsCollection::all_unavailable("offline")
            };
            let config = EvidenceConfig { top_n, ..EvidenceConfig::default() };
            let evidence = EvidenceRanker::new(config).rank(&items, &metrics, &now());

            prop_assert!(evidence.len() <= top_n);
            let unique: HashSet<_> = evidence.iter().map(|e| e.key.as_str()).collect();
            prop_assert_eq!(unique.len(), evidence.len());
        }
    }
}
