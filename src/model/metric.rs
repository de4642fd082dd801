use crate::model::WorkStatus;
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNASSIGNED_LABEL: &str = "(unassigned)";

/// One independently fetched dataset.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Burndown,
    Velocity,
    StatusDistribution,
    TimeInStatus,
    AssigneeWorkload,
    IssueCounts,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Burndown,
        MetricKind::Velocity,
        MetricKind::StatusDistribution,
        MetricKind::TimeInStatus,
        MetricKind::AssigneeWorkload,
        MetricKind::IssueCounts,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Burndown => "burndown",
            MetricKind::Velocity => "velocity",
            MetricKind::StatusDistribution => "status distribution",
            MetricKind::TimeInStatus => "time in status",
            MetricKind::AssigneeWorkload => "assignee workload",
            MetricKind::IssueCounts => "issue counts",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurndownPoint {
    pub date: NaiveDate,
    pub remaining: f64,
    pub ideal: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BurndownSeries {
    pub capacity: f64,
    pub points: Vec<BurndownPoint>,
}

impl BurndownSeries {
    /// Mean points burned per day over the recorded days.
    pub fn actual_daily_burn(&self) -> Option<f64> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        let days = (last.date - first.date).num_days();
        if days <= 0 {
            return None;
        }
        Some((first.remaining - last.remaining).max(0.0) / days as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VelocitySample {
    pub sprint: String,
    pub planned_points: f64,
    pub completed_points: f64,
}

/// Closed sprints, most recent first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VelocityHistory {
    pub samples: Vec<VelocitySample>,
}

impl VelocityHistory {
    pub fn average_completed(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.completed_points).sum();
        Some(sum / self.samples.len() as f64)
    }

    pub fn last_completed(&self) -> Option<f64> {
        self.samples.first().map(|s| s.completed_points)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDistribution(pub IndexMap<WorkStatus, u64>);

#[derive(Debug, Clone, PartialEq)]
pub struct ItemStatusTimes {
    pub current_status: WorkStatus,
    /// Time since the current status was entered; absent once terminal.
    pub current: Option<Duration>,
    pub by_status: IndexMap<WorkStatus, Duration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeInStatus {
    pub per_item: IndexMap<String, ItemStatusTimes>,
}

impl TimeInStatus {
    pub fn current_for(&self, key: &str) -> Option<&ItemStatusTimes> {
        self.per_item.get(key)
    }

    /// Mean time per status across the items that spent any time in it.
    pub fn mean_by_status(&self) -> IndexMap<WorkStatus, Duration> {
        let mut sums: IndexMap<WorkStatus, (Duration, i32)> = IndexMap::new();
        for times in self.per_item.values() {
            for (status, spent) in &times.by_status {
                let entry = sums.entry(*status).or_insert((Duration::zero(), 0));
                entry.0 = entry.0 + *spent;
                entry.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(status, (sum, count))| (status, sum / count.max(1)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssigneeLoad {
    pub items: u64,
    pub done: u64,
    pub story_points: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssigneeWorkload(pub IndexMap<String, AssigneeLoad>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IssueCounts {
    pub overdue: u64,
    pub due_soon: u64,
    pub high_priority_todo: u64,
    pub unassigned: u64,
    pub reopened: u64,
    pub project_open: u64,
    pub project_total: u64,
    pub project_sprints: u64,
}

/// A present metric value; the variant determines its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    Burndown(BurndownSeries),
    Velocity(VelocityHistory),
    StatusDistribution(StatusDistribution),
    TimeInStatus(TimeInStatus),
    AssigneeWorkload(AssigneeWorkload),
    IssueCounts(IssueCounts),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Burndown(_) => MetricKind::Burndown,
            Metric::Velocity(_) => MetricKind::Velocity,
            Metric::StatusDistribution(_) => MetricKind::StatusDistribution,
            Metric::TimeInStatus(_) => MetricKind::TimeInStatus,
            Metric::AssigneeWorkload(_) => MetricKind::AssigneeWorkload,
            Metric::IssueCounts(_) => MetricKind::IssueCounts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Present(Metric),
    Unavailable { reason: String },
}

impl MetricValue {
    pub fn unavailable(reason: impl ToString) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn present(&self) -> Option<&Metric> {
        match self {
            MetricValue::Present(metric) => Some(metric),
            MetricValue::Unavailable { .. } => None,
        }
    }
}

/// Every metric kind with its value, possibly unavailable. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsCollection {
    values: IndexMap<MetricKind, MetricValue>,
}

impl MetricsCollection {
    /// Kinds missing from `values` are recorded as unavailable.
    pub fn new(mut values: IndexMap<MetricKind, MetricValue>) -> Self {
        let values = MetricKind::ALL
            .iter()
            .map(|kind| {
                let value = values
                    .shift_remove(kind)
                    .unwrap_or_else(|| MetricValue::unavailable("no fetcher registered"));
                (*kind, value)
            })
            .collect();
        Self { values }
    }

    pub fn all_unavailable(reason: impl ToString) -> Self {
        let reason = reason.to_string();
        Self::new(
            MetricKind::ALL
                .iter()
                .map(|kind| (*kind, MetricValue::unavailable(&reason)))
                .collect(),
        )
    }

    pub fn get(&self, kind: MetricKind) -> &MetricValue {
        // `new` inserts every kind.
        &self.values[&kind]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKind, &MetricValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Failure ledger: each unavailable kind with its reason.
    pub fn unavailable(&self) -> Vec<(MetricKind, &str)> {
        self.values
            .iter()
            .filter_map(|(kind, value)| match value {
                MetricValue::Unavailable { reason } => Some((*kind, reason.as_str())),
                MetricValue::Present(_) => None,
            })
            .collect()
    }

    pub fn burndown(&self) -> Option<&BurndownSeries> {
        match self.get(MetricKind::Burndown).present()? {
            Metric::Burndown(series) => Some(series),
            _ => None,
        }
    }

    pub fn velocity(&self) -> Option<&VelocityHistory> {
        match self.get(MetricKind::Velocity).present()? {
            Metric::Velocity(history) => Some(history),
            _ => None,
        }
    }

    pub fn status_distribution(&self) -> Option<&StatusDistribution> {
        match self.get(MetricKind::StatusDistribution).present()? {
            Metric::StatusDistribution(distribution) => Some(distribution),
            _ => None,
        }
    }

    pub fn time_in_status(&self) -> Option<&TimeInStatus> {
        match self.get(MetricKind::TimeInStatus).present()? {
            Metric::TimeInStatus(times) => Some(times),
            _ => None,
        }
    }

    pub fn assignee_workload(&self) -> Option<&AssigneeWorkload> {
        match self.get(MetricKind::AssigneeWorkload).present()? {
            Metric::AssigneeWorkload(workload) => Some(workload),
            _ => None,
        }
    }

    pub fn issue_counts(&self) -> Option<&IssueCounts> {
        match self.get(MetricKind::IssueCounts).present()? {
            Metric::IssueCounts(counts) => Some(counts),
            _ => None,
        }
    }
}
