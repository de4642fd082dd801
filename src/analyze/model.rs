use crate::model::WorkStatus;
use chrono::{Duration, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;

/// Scalar facts derived once per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSet {
    pub completion_rate: f64,
    pub target_rate: f64,
    pub required_per_day: u64,
    pub remaining_days: u64,
    pub risk_percent: f64,
    pub risk_breakdown: Vec<RiskContribution>,
}

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    TargetUnreachable,
    PaceGap,
    Overdue,
    Blocked,
    Reopened,
    Unassigned,
}

impl RiskFactor {
    pub fn label(&self) -> &'static str {
        match self {
            RiskFactor::TargetUnreachable => "target unreachable",
            RiskFactor::PaceGap => "behind expected pace",
            RiskFactor::Overdue => "overdue items",
            RiskFactor::Blocked => "blocked items",
            RiskFactor::Reopened => "reopened items",
            RiskFactor::Unassigned => "unassigned items",
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One active risk signal and the points it adds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskContribution {
    pub factor: RiskFactor,
    pub points: f64,
}

/// Named counters surfaced next to the KPIs. `None` means the source metric
/// was unavailable, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskCounters {
    pub overdue: Option<u64>,
    pub due_soon: Option<u64>,
    pub high_priority_todo: Option<u64>,
    pub unassigned: Option<u64>,
    pub reopened: Option<u64>,
    pub blocked: u64,
}

/// Why a work item made it into the evidence list. Variants are listed in
/// rule priority order.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceReason {
    StaleInReview,
    StaleUnassigned,
    StaleAssigned,
    Blocked,
    Reopened,
    AbortedUnassigned,
    NewUnassigned,
}

impl EvidenceReason {
    pub fn describe(&self, staleness: Option<Duration>) -> String {
        let elapsed = staleness.map(|d| format!("{:.1} days", days(d)));
        match (self, elapsed) {
            (EvidenceReason::StaleInReview, Some(days)) => format!("in review for {days} without progress"),
            (EvidenceReason::StaleUnassigned, Some(days)) => format!("no assignee and unchanged for {days}"),
            (EvidenceReason::StaleAssigned, Some(days)) => format!("assigned but unchanged for {days}"),
            (EvidenceReason::StaleInReview, None) => "stuck in review".to_string(),
            (EvidenceReason::StaleUnassigned, None) => "stale with no assignee".to_string(),
            (EvidenceReason::StaleAssigned, None) => "stale while assigned".to_string(),
            (EvidenceReason::Blocked, _) => "blocked".to_string(),
            (EvidenceReason::Reopened, _) => "reopened after being closed".to_string(),
            (EvidenceReason::AbortedUnassigned, _) => "aborted with no assignee".to_string(),
            (EvidenceReason::NewUnassigned, _) => "recently added with no assignee".to_string(),
        }
    }
}

/// A ranked concerning work item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceItem {
    pub key: String,
    pub title: String,
    pub status: WorkStatus,
    pub assignee: Option<String>,
    #[serde(rename = "staleness_days", serialize_with = "serialize_days")]
    pub staleness: Option<Duration>,
    pub reason: EvidenceReason,
    pub justification: String,
    pub due: Option<NaiveDate>,
}

/// Due date relative to `today`: overdue, today, within three days, or the
/// date itself.
pub(crate) fn describe_due(due: NaiveDate, today: NaiveDate) -> String {
    let delta = due.signed_duration_since(today).num_days();
    let plural = |n: i64| if n == 1 { "" } else { "s" };
    match delta {
        d if d < 0 => format!("overdue by {} day{}", -d, plural(-d)),
        0 => "due today".to_string(),
        d @ 1..=3 => format!("due in {d} day{}", plural(d)),
        _ => format!("due {}", due.format("%Y-%m-%d")),
    }
}

pub(crate) fn days(duration: Duration) -> f64 {
    duration.num_seconds() as f64 / 86_400.0
}

fn serialize_days<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_some(&days(*duration)),
        None => serializer.serialize_none(),
    }
}
