use crate::analyze::{KpiSet, RiskContribution, RiskCounters, RiskFactor};
use crate::model::{MetricsCollection, RiskWeights, SprintScope, WorkItemSet};
use chrono::{DateTime, FixedOffset};
use tracing::debug;

// Absorbs float noise such as 0.8 * 45 = 36.000000000000004.
const ROUNDING_SLACK: f64 = 1e-9;

/// Derives completion and risk figures. Never fails: an unavailable metric
/// only drops its own risk contribution.
#[derive(Debug, Clone, Default)]
pub struct KpiEngine {
    weights: RiskWeights,
}

impl KpiEngine {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    pub fn compute(
        &self,
        items: &WorkItemSet,
        scope: &SprintScope,
        metrics: &MetricsCollection,
        now: &DateTime<FixedOffset>,
    ) -> KpiSet {
        let totals = items.totals();
        let completion_rate = totals.done as f64 / totals.total.max(1) as f64;
        let remaining_days = scope.window.remaining_days(now);
        let target_count = target_count(scope.target_rate, totals.total);

        let required_per_day = if remaining_days == 0 {
            0
        } else {
            target_count.saturating_sub(totals.done).div_ceil(remaining_days)
        };

        let mut breakdown = Vec::new();
        let mut add = |factor, points: f64| {
            if points > 0.0 {
                breakdown.push(RiskContribution { factor, points });
            }
        };

        if remaining_days == 0 && totals.done < target_count {
            add(RiskFactor::TargetUnreachable, self.weights.unreachable);
        }
        if totals.total > 0 {
            let expected = scope.target_rate * scope.window.elapsed_fraction(now);
            let shortfall = expected - completion_rate;
            add(RiskFactor::PaceGap, self.weights.pace_gap * shortfall / scope.target_rate);
        }

        let counters = risk_counters(items, metrics);
        let counter_terms = [
            (RiskFactor::Overdue, counters.overdue, self.weights.per_overdue),
            (RiskFactor::Blocked, Some(counters.blocked), self.weights.per_blocked),
            (RiskFactor::Reopened, counters.reopened, self.weights.per_reopened),
            (RiskFactor::Unassigned, counters.unassigned, self.weights.per_unassigned),
        ];
        for (factor, count, weight) in counter_terms {
            if let Some(count) = count {
                add(factor, (count as f64 * weight).min(self.weights.counter_cap));
            }
        }

        let risk_percent = breakdown.iter().map(|c| c.points).sum::<f64>().clamp(0.0, 100.0);
        debug!(
            sprint = %scope.label,
            completion_rate,
            remaining_days,
            required_per_day,
            risk_percent,
            "kpis computed"
        );

        KpiSet {
            completion_rate,
            target_rate: scope.target_rate,
            required_per_day,
            remaining_days,
            risk_percent,
            risk_breakdown: breakdown,
        }
    }
}

/// Items that must be done to meet the target, rounded up.
pub fn target_count(target_rate: f64, total: u64) -> u64 {
    (target_rate * total as f64 - ROUNDING_SLACK).ceil().max(0.0) as u64
}

/// Counters from the issue-count metric, absent when it is unavailable.
/// Blocked items come straight from the work item set.
pub fn risk_counters(items: &WorkItemSet, metrics: &MetricsCollection) -> RiskCounters {
    let counts = metrics.issue_counts();
    RiskCounters {
        overdue: counts.map(|c| c.overdue),
        due_soon: counts.map(|c| c.due_soon),
        high_priority_todo: counts.map(|c| c.high_priority_todo),
        unassigned: counts.map(|c| c.unassigned),
        reopened: counts.map(|c| c.reopened),
        blocked: items.blocked_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        IssueCounts, Metric, MetricKind, MetricValue, ParentItem, SprintWindow, WorkItem, WorkStatus,
    };
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn scope(target: f64) -> SprintScope {
        let window = SprintWindow {
            start: at("2024-05-01T09:00:00+09:00"),
            end: at("2024-05-15T09:00:00+09:00"),
        };
        SprintScope::new(3, 12, "Sprint 12", window, target).unwrap()
    }

    fn items(total: usize, done: usize) -> WorkItemSet {
        let start = at("2024-05-01T09:00:00+09:00");
        let parents = (0..total)
            .map(|i| {
                let status = if i < done { WorkStatus::Done } else { WorkStatus::InProgress };
                ParentItem::new(WorkItem::new(format!("P-{i}"), "task", status, start), vec![])
            })
            .collect();
        WorkItemSet::new(parents).unwrap()
    }

    fn with_counts(counts: IssueCounts) -> MetricsCollection {
        let mut values = IndexMap::new();
        values.insert(MetricKind::IssueCounts, MetricValue::Present(Metric::IssueCounts(counts)));
        MetricsCollection::new(values)
    }

    #[test]
    fn closed_window_below_target_is_full_risk() {
        let kpis = KpiEngine::default().compute(
            &items(45, 27),
            &scope(0.8),
            &MetricsCollection::all_unavailable("offline"),
            &at("2024-05-16T09:00:00+09:00"),
        );

        assert_eq!(kpis.completion_rate, 0.6);
        assert_eq!(kpis.remaining_days, 0);
        assert_eq!(kpis.required_per_day, 0);
        assert_eq!(kpis.risk_percent, 100.0);
        assert_eq!(kpis.risk_breakdown[0].factor, RiskFactor::TargetUnreachable);
    }

    #[test]
    fn empty_sprint_has_zero_completion_and_no_requirement() {
        let kpis = KpiEngine::default().compute(
            &WorkItemSet::empty(),
            &scope(0.8),
            &MetricsCollection::all_unavailable("offline"),
            &at("2024-05-08T09:00:00+09:00"),
        );
        assert_eq!(kpis.completion_rate, 0.0);
        assert_eq!(kpis.required_per_day, 0);
        assert_eq!(kpis.risk_percent, 0.0);
        assert!(kpis.risk_breakdown.is_empty());
    }

    #[test]
    fn required_throughput_rounds_up_over_remaining_days() {
        // 0.8 * 20 = 16 to do, 4 done, 12 over 5 days.
        let kpis = KpiEngine::default().compute(
            &items(20, 4),
            &scope(0.8),
            &MetricsCollection::all_unavailable("offline"),
            &at("2024-05-10T09:00:00+09:00"),
        );
        assert_eq!(kpis.remaining_days, 5);
        assert_eq!(kpis.required_per_day, 3);
    }

    #[test]
    fn exceeded_target_requires_nothing() {
        let kpis = KpiEngine::default().compute(
            &items(10, 10),
            &scope(0.8),
            &MetricsCollection::all_unavailable("offline"),
            &at("2024-05-03T09:00:00+09:00"),
        );
        assert_eq!(kpis.required_per_day, 0);
        assert_eq!(kpis.risk_percent, 0.0);
    }

    #[test]
    fn counters_are_capped_and_missing_counts_are_skipped() {
        let engine = KpiEngine::default();
        let now = at("2024-05-01T09:00:00+09:00");
        let counts = IssueCounts {
            overdue: 10,
            reopened: 1,
            ..IssueCounts::default()
        };

        let kpis = engine.compute(&items(4, 4), &scope(0.8), &with_counts(counts), &now);
        let breakdown: Vec<_> = kpis.risk_breakdown.iter().map(|c| (c.factor, c.points)).collect();
        assert_eq!(breakdown, vec![(RiskFactor::Overdue, 25.0), (RiskFactor::Reopened, 3.0)]);
        assert_eq!(kpis.risk_percent, 28.0);

        let unavailable = engine.compute(
            &items(4, 4),
            &scope(0.8),
            &MetricsCollection::all_unavailable("offline"),
            &now,
        );
        assert_eq!(unavailable.risk_percent, 0.0);
    }

    #[test]
    fn pace_gap_grows_with_elapsed_time() {
        let engine = KpiEngine::default();
        let metrics = MetricsCollection::all_unavailable("offline");
        let early = engine.compute(&items(10, 2), &scope(0.8), &metrics, &at("2024-05-04T09:00:00+09:00"));
        let late = engine.compute(&items(10, 2), &scope(0.8), &metrics, &at("2024-05-12T09:00:00+09:00"));
        assert!(late.risk_percent > early.risk_percent);
        assert_eq!(late.risk_breakdown[0].factor, RiskFactor::PaceGap);
    }

    #[test]
    fn target_count_ignores_float_noise() {
        assert_eq!(target_count(0.8, 45), 36);
        assert_eq!(target_count(0.7, 10), 7);
        assert_eq!(target_count(0.75, 5), 4);
        assert_eq!(target_count(1.0, 0), 0);
    }

    proptest! {
        #[test]
        fn kpis_stay_within_bounds(
            total in 0usize..40,
            done_share in 0.0f64..=1.0,
            target in 0.05f64..=1.0,
            day in 0i64..30,
            overdue in 0u64..50,
            unassigned in 0u64..50,
        ) {
            let done = (total as f64 * done_share).floor() as usize;
            let now = at("2024-04-25T09:00:00+09:00") + chrono::Duration::days(day);
            let metrics = with_counts(IssueCounts { overdue, unassigned, ..IssueCounts::default() });
            let kpis = KpiEngine::default().compute(&items(total, done), &scope(target), &metrics, &now);

            prop_assert!((0.0..=1.0).contains(&kpis.completion_rate));
            prop_assert!((0.0..=100.0).contains(&kpis.risk_percent));
            prop_assert!(kpis.remaining_days <= 20);
            if kpis.remaining_days == 0 {
                prop_assert_eq!(kpis.required_per_day, 0);
            }
        }
    }
}
