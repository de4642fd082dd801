//! Metric fetchers that derive every metric from an already fetched
//! snapshot of the sprint instead of querying the tracker again. Used by the
//! command-line report and as realistic collaborators in tests.

use crate::collect::{FetchResult, MetricFetcher, MetricRegistry};
use crate::model::{
    AssigneeLoad, AssigneeWorkload, BurndownPoint, BurndownSeries, FetchError, IssueCounts,
    ItemStatusTimes, Metric, MetricKind, SprintScope, StatusDistribution, TimeInStatus,
    VelocityHistory, VelocitySample, WorkItemSet, WorkStatus, UNASSIGNED_LABEL,
};
use chrono::{DateTime, Days, Duration, FixedOffset};
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use serde::Deserialize;

/// Project-wide figures that are not derivable from the sprint items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProjectTotals {
    pub open: u64,
    pub total: u64,
    pub sprints: u64,
}

/// Everything the snapshot fetchers read. Plays the role of the tracker client.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub items: WorkItemSet,
    pub as_of: DateTime<FixedOffset>,
    pub velocity: Vec<VelocitySample>,
    pub project: Option<ProjectTotals>,
    pub due_soon_days: u64,
}

impl Snapshot {
    pub fn new(items: WorkItemSet, as_of: DateTime<FixedOffset>) -> Self {
        Self {
            items,
            as_of,
            velocity: Vec::new(),
            project: None,
            due_soon_days: 7,
        }
    }

    pub fn with_velocity(mut self, samples: Vec<VelocitySample>) -> Self {
        self.velocity = samples;
        self
    }

    pub fn with_project(mut self, project: ProjectTotals) -> Self {
        self.project = Some(project);
        self
    }
}

/// A registry with one snapshot fetcher for every metric kind.
pub fn snapshot_registry() -> MetricRegistry<Snapshot> {
    MetricRegistry::new()
        .with(BurndownFetcher)
        .with(VelocityFetcher)
        .with(StatusDistributionFetcher)
        .with(TimeInStatusFetcher)
        .with(AssigneeWorkloadFetcher)
        .with(IssueCountsFetcher)
}

pub struct BurndownFetcher;

impl MetricFetcher<Snapshot> for BurndownFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::Burndown
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move { burndown(client, scope).map(Metric::Burndown) }.boxed()
    }
}

fn burndown(snapshot: &Snapshot, scope: &SprintScope) -> Result<BurndownSeries, FetchError> {
    let start = scope.window.start.date_naive();
    let end = scope.window.end.date_naive();
    let last = end.min(snapshot.as_of.date_naive());
    if last < start {
        return Err(FetchError::Malformed(format!(
            "sprint `{}` has not started yet",
            scope.label
        )));
    }

    let capacity: f64 = snapshot.items.units().map(|i| i.capacity_points()).sum();
    let burns: Vec<_> = snapshot
        .items
        .units()
        .filter(|i| i.is_done())
        .map(|i| (i.status_entered.date_naive(), i.capacity_points()))
        .collect();
    let total_days = (end - start).num_days().max(1) as f64;

    let points = start
        .iter_days()
        .take_while(|day| *day <= last)
        .enumerate()
        .map(|(index, day)| {
            let burned: f64 = burns.iter().filter(|(d, _)| *d <= day).map(|(_, p)| p).sum();
            BurndownPoint {
                date: day,
                remaining: (capacity - burned).max(0.0),
                ideal: capacity * (1.0 - index as f64 / total_days).max(0.0),
            }
        })
        .collect();
    Ok(BurndownSeries { capacity, points })
}

pub struct VelocityFetcher;

impl MetricFetcher<Snapshot> for VelocityFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::Velocity
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, _scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move {
            let samples: Vec<_> = client
                .velocity
                .iter()
                .filter(|s| s.planned_points > 0.0 || s.completed_points > 0.0)
                .cloned()
                .collect();
            if samples.is_empty() {
                return Err(FetchError::Malformed("no closed sprint with story points".into()));
            }
            Ok(Metric::Velocity(VelocityHistory { samples }))
        }
        .boxed()
    }
}

pub struct StatusDistributionFetcher;

impl MetricFetcher<Snapshot> for StatusDistributionFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::StatusDistribution
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, _scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move {
            let mut counts: IndexMap<WorkStatus, u64> =
                WorkStatus::ALL.iter().map(|s| (*s, 0)).collect();
            for item in client.items.units() {
                *counts.entry(item.status).or_insert(0) += 1;
            }
            Ok(Metric::StatusDistribution(StatusDistribution(counts)))
        }
        .boxed()
    }
}

pub struct TimeInStatusFetcher;

impl MetricFetcher<Snapshot> for TimeInStatusFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::TimeInStatus
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move { Ok(Metric::TimeInStatus(time_in_status(client, scope))) }.boxed()
    }
}

fn time_in_status(snapshot: &Snapshot, scope: &SprintScope) -> TimeInStatus {
    let until = snapshot.as_of.min(scope.window.end);
    let mut per_item = IndexMap::new();
    for item in snapshot.items.all_items() {
        if per_item.contains_key(&item.key) {
            continue;
        }
        let mut by_status = IndexMap::new();
        if !item.status.is_terminal() {
            let since = item.status_entered.max(scope.window.start);
            let spent = until.signed_duration_since(since);
            if spent > Duration::zero() {
                by_status.insert(item.status, spent);
            }
        }
        per_item.insert(
            item.key.clone(),
            ItemStatusTimes {
                current_status: item.status,
                current: item.time_in_current_status(&snapshot.as_of),
                by_status,
            },
        );
    }
    TimeInStatus { per_item }
}

pub struct AssigneeWorkloadFetcher;

impl MetricFetcher<Snapshot> for AssigneeWorkloadFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::AssigneeWorkload
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, _scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move {
            let mut workload: IndexMap<String, AssigneeLoad> = IndexMap::new();
            for item in client.items.units() {
                let assignee = match &item.assignee {
                    Some(name) if !item.is_unassigned() => name.clone(),
                    _ => UNASSIGNED_LABEL.to_string(),
                };
                let load = workload.entry(assignee).or_default();
                load.items += 1;
                load.done += u64::from(item.is_done());
                load.story_points += item.capacity_points();
            }
            Ok(Metric::AssigneeWorkload(AssigneeWorkload(workload)))
        }
        .boxed()
    }
}

pub struct IssueCountsFetcher;

impl MetricFetcher<Snapshot> for IssueCountsFetcher {
    fn kind(&self) -> MetricKind {
        MetricKind::IssueCounts
    }

    fn fetch<'a>(&'a self, client: &'a Snapshot, _scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move { Ok(Metric::IssueCounts(issue_counts(client))) }.boxed()
    }
}

fn issue_counts(snapshot: &Snapshot) -> IssueCounts {
    let today = snapshot.as_of.date_naive();
    let horizon = today
        .checked_add_days(Days::new(snapshot.due_soon_days))
        .unwrap_or(today);
    let project = snapshot.project.unwrap_or_default();

    let mut counts = IssueCounts {
        project_open: project.open,
        project_total: project.total,
        project_sprints: project.sprints,
        ..IssueCounts::default()
    };
    for item in snapshot.items.units() {
        let open = !item.status.is_terminal();
        if item.is_overdue(today) {
            counts.overdue += 1;
        }
        if open && item.due.is_some_and(|due| due >= today && due <= horizon) {
            counts.due_soon += 1;
        }
        if item.status == WorkStatus::ToDo && item.priority.is_some_and(|p| p.is_high()) {
            counts.high_priority_todo += 1;
        }
        if open && item.is_unassigned() {
            counts.unassigned += 1;
        }
        if item.reopened {
            counts.reopened += 1;
        }
    }
    counts
}
