use crate::analyze::{days, risk_counters, EvidenceItem, EvidenceReason, KpiSet, RiskCounters, RiskFactor};
use crate::model::{
    MetricKind, MetricsCollection, SprintScope, SprintWindow, Totals, WorkItemSet, WorkStatus,
    UNASSIGNED_LABEL,
};
use itertools::Itertools;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocitySummary {
    pub average_completed: f64,
    pub last_completed: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bottleneck {
    pub status: WorkStatus,
    pub mean_days: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusiestAssignee {
    pub name: String,
    pub open_items: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnavailableMetric {
    pub kind: MetricKind,
    pub reason: String,
}

/// Everything handed to the narrative generator and the report renderer.
/// Optional fields are `None` when their source metric was unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeContext {
    pub sprint: String,
    pub window: SprintWindow,
    pub totals: Totals,
    pub kpis: KpiSet,
    pub counters: RiskCounters,
    pub evidence: Vec<EvidenceItem>,
    pub velocity: Option<VelocitySummary>,
    pub daily_burn: Option<f64>,
    pub bottleneck: Option<Bottleneck>,
    pub review_mean_days: Option<f64>,
    pub busiest_assignee: Option<BusiestAssignee>,
    pub suggested_actions: Vec<String>,
    pub unavailable: Vec<UnavailableMetric>,
}

impl NarrativeContext {
    pub fn build(
        scope: &SprintScope,
        items: &WorkItemSet,
        kpis: KpiSet,
        metrics: &MetricsCollection,
        evidence: Vec<EvidenceItem>,
    ) -> Self {
        let counters = risk_counters(items, metrics);
        let velocity = metrics.velocity().and_then(|history| {
            Some(VelocitySummary {
                average_completed: history.average_completed()?,
                last_completed: history.last_completed()?,
                samples: history.samples.len(),
            })
        });

        let means = metrics.time_in_status().map(|times| times.mean_by_status());
        let bottleneck = means.as_ref().and_then(|means| {
            means
                .iter()
                .filter(|(status, _)| !status.is_terminal())
                .max_by_key(|(_, mean)| **mean)
                .map(|(status, mean)| Bottleneck {
                    status: *status,
                    mean_days: days(*mean),
                })
        });
        let review_mean_days = means
            .as_ref()
            .and_then(|means| means.get(&WorkStatus::Reviewing))
            .map(|mean| days(*mean));

        let busiest_assignee = metrics.assignee_workload().and_then(|workload| {
            workload
                .0
                .iter()
                .filter(|(name, _)| name.as_str() != UNASSIGNED_LABEL)
                .map(|(name, load)| (name, load.items.saturating_sub(load.done)))
                .filter(|(_, open)| *open > 0)
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(name, open_items)| BusiestAssignee {
                    name: name.clone(),
                    open_items,
                })
        });

        let unavailable = metrics
            .unavailable()
            .into_iter()
            .map(|(kind, reason)| UnavailableMetric {
                kind,
                reason: reason.to_string(),
            })
            .collect();

        let mut context = Self {
            sprint: scope.label.clone(),
            window: scope.window,
            totals: items.totals(),
            kpis,
            counters,
            evidence,
            velocity,
            daily_burn: metrics.burndown().and_then(|series| series.actual_daily_burn()),
            bottleneck,
            review_mean_days,
            busiest_assignee,
            suggested_actions: Vec::new(),
            unavailable,
        };
        context.suggested_actions = context.suggest_actions();
        context
    }

    fn suggest_actions(&self) -> Vec<String> {
        let mut actions = Vec::new();
        let unreachable = self
            .kpis
            .risk_breakdown
            .iter()
            .any(|c| c.factor == RiskFactor::TargetUnreachable);

        if unreachable {
            actions.push("Agree which remaining items move to the next sprint".to_string());
        } else if self.kpis.required_per_day > 0 {
            let pace = match self.daily_burn {
                Some(burn) if burn < self.kpis.required_per_day as f64 => format!(
                    "Close {} items per day to reach the target (current pace {burn:.1})",
                    self.kpis.required_per_day
                ),
                _ => format!(
                    "Close {} items per day to reach the target",
                    self.kpis.required_per_day
                ),
            };
            actions.push(pace);
        }
        if let Some(overdue) = self.counters.overdue.filter(|n| *n > 0) {
            actions.push(format!("Re-plan the {overdue} overdue items"));
        }
        if self.counters.blocked > 0 {
            actions.push(format!("Unblock the {} blocked items", self.counters.blocked));
        }
        if self.evidence.iter().any(|e| e.reason == EvidenceReason::StaleInReview) {
            actions.push("Clear the review queue".to_string());
        }
        if let Some(unassigned) = self.counters.unassigned.filter(|n| *n > 0) {
            actions.push(format!("Assign owners to the {unassigned} unassigned items"));
        }
        if let Some(reopened) = self.counters.reopened.filter(|n| *n > 0) {
            actions.push(format!("Check why {reopened} items were reopened"));
        }
        actions
    }

    /// Plain-text summary used whenever the generator gives no usable text.
    pub fn fallback_summary(&self) -> String {
        let mut lines = vec![
            format!(
                "{} ({} - {}): {}/{} done ({:.0}%), target {:.0}%.",
                self.sprint,
                self.window.start.format("%d.%m.%Y"),
                self.window.end.format("%d.%m.%Y"),
                self.totals.done,
                self.totals.total,
                self.kpis.completion_rate * 100.0,
                self.kpis.target_rate * 100.0,
            ),
            format!(
                "{} days left, {} items per day needed. Risk {:.0}%.",
                self.kpis.remaining_days, self.kpis.required_per_day, self.kpis.risk_percent,
            ),
            format!(
                "Overdue {}, blocked {}, reopened {}, unassigned {}.",
                count(self.counters.overdue),
                self.counters.blocked,
                count(self.counters.reopened),
                count(self.counters.unassigned),
            ),
        ];

        if !self.evidence.is_empty() {
            lines.push("Top concerns:".to_string());
            lines.extend(
                self.evidence
                    .iter()
                    .map(|e| format!("- {} {}: {}", e.key, e.title, e.justification)),
            );
        }
        if !self.suggested_actions.is_empty() {
            lines.push("Suggested actions:".to_string());
            lines.extend(self.suggested_actions.iter().map(|a| format!("- {a}")));
        }
        if !self.unavailable.is_empty() {
            lines.push(format!(
                "Unavailable metrics: {}.",
                self.unavailable
                    .iter()
                    .map(|u| format!("{} ({})", u.kind, u.reason))
                    .join(", ")
            ));
        }
        lines.join("\n")
    }
}

fn count(value: Option<u64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{EvidenceRanker, KpiEngine};
    use crate::model::{
        AssigneeLoad, AssigneeWorkload, IssueCounts, ItemStatusTimes, Metric, MetricValue,
        ParentItem, TimeInStatus, WorkItem,
    };
    use chrono::{DateTime, Duration, FixedOffset};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn scope() -> SprintScope {
        let window = SprintWindow {
            start: at("2024-05-01T09:00:00+09:00"),
            end: at("2024-05-15T09:00:00+09:00"),
        };
        SprintScope::new(3, 12, "Sprint 12", window, 0.8).unwrap()
    }

    fn items() -> WorkItemSet {
        let start = at("2024-05-01T09:00:00+09:00");
        WorkItemSet::new(vec![ParentItem::new(
            WorkItem::new("P-1", "Checkout", WorkStatus::InProgress, start),
            vec![
                WorkItem::new("S-1", "Cart API", WorkStatus::Done, start).with_assignee("alice"),
                WorkItem::new("S-2", "Cart UI", WorkStatus::Reviewing, start)
                    .with_assignee("bob")
                    .blocked(),
            ],
        )])
        .unwrap()
    }

    fn build(metrics: &MetricsCollection) -> NarrativeContext {
        let now = at("2024-05-08T09:00:00+09:00");
        let items = items();
        let kpis = KpiEngine::default().compute(&items, &scope(), metrics, &now);
        let evidence = EvidenceRanker::default().rank(&items, metrics, &now);
        NarrativeContext::build(&scope(), &items, kpis, metrics, evidence)
    }

    #[test]
    fn unavailable_metrics_stay_absent() {
        let context = build(&MetricsCollection::all_unavailable("network error: offline"));

        assert_eq!(context.counters.overdue, None);
        assert_eq!(context.counters.blocked, 1);
        assert_eq!(context.velocity, None);
        assert_eq!(context.bottleneck, None);
        assert_eq!(context.unavailable.len(), 6);
        assert_eq!(context.totals, Totals { total: 2, done: 1, not_done: 1 });

        let json = serde_json::to_value(&context).unwrap();
        assert!(json["counters"]["overdue"].is_null());
        assert_eq!(json["counters"]["blocked"], 1);
    }

    #[test]
    fn present_metrics_feed_supplements_and_actions() {
        let mut values = IndexMap::new();
        values.insert(
            MetricKind::IssueCounts,
            MetricValue::Present(Metric::IssueCounts(IssueCounts {
                overdue: 2,
                unassigned: 0,
                ..IssueCounts::default()
            })),
        );
        let mut workload = IndexMap::new();
        workload.insert("alice".to_string(), AssigneeLoad { items: 3, done: 3, story_points: 5.0 });
        workload.insert("bob".to_string(), AssigneeLoad { items: 4, done: 1, story_points: 8.0 });
        values.insert(
            MetricKind::AssigneeWorkload,
            MetricValue::Present(Metric::AssigneeWorkload(AssigneeWorkload(workload))),
        );
        let context = build(&MetricsCollection::new(values));

        assert_eq!(context.counters.overdue, Some(2));
        assert_eq!(
            context.busiest_assignee,
            Some(BusiestAssignee { name: "bob".to_string(), open_items: 3 })
        );
        assert!(context.suggested_actions.contains(&"Re-plan the 2 overdue items".to_string()));
        assert!(context.suggested_actions.contains(&"Unblock the 1 blocked items".to_string()));
        assert!(!context.suggested_actions.iter().any(|a| a.starts_with("Assign owners")));
    }

    #[test]
    fn fallback_summary_lists_facts_and_gaps() {
        let context = build(&MetricsCollection::all_unavailable("network error: offline"));
        let summary = context.fallback_summary();

        assert!(summary.starts_with("Sprint 12 (01.05.2024 - 15.05.2024): 1/2 done (50%), target 80%."));
        assert!(summary.contains("7 days left, 1 items per day needed."));
        assert!(summary.contains("Overdue n/a, blocked 1, reopened n/a, unassigned n/a."));
        assert!(summary.contains("- S-2 Cart UI: blocked"));
        assert!(summary.contains("Unavailable metrics: burndown (network error: offline)"));
    }

    #[test]
    fn bottleneck_is_the_slowest_open_status() {
        let mut per_item = IndexMap::new();
        for (key, status, hours) in [
            ("A", WorkStatus::Reviewing, 60),
            ("B", WorkStatus::InProgress, 20),
            ("C", WorkStatus::Done, 200),
        ] {
            let mut by_status = IndexMap::new();
            by_status.insert(status, Duration::hours(hours));
            per_item.insert(
                key.to_string(),
                ItemStatusTimes {
                    current_status: status,
                    current: None,
                    by_status,
                },
            );
        }
        let mut values = IndexMap::new();
        values.insert(
            MetricKind::TimeInStatus,
            MetricValue::Present(Metric::TimeInStatus(TimeInStatus { per_item })),
        );
        let context = build(&MetricsCollection::new(values));

        assert_eq!(
            context.bottleneck,
            Some(Bottleneck { status: WorkStatus::Reviewing, mean_days: 2.5 })
        );
        assert_eq!(context.review_mean_days, Some(2.5));
    }
}
