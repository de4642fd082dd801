use crate::model::{PipelineError, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum WorkStatus {
    ToDo,
    InProgress,
    Reviewing,
    Done,
    Aborted,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 5] = [
        WorkStatus::ToDo,
        WorkStatus::InProgress,
        WorkStatus::Reviewing,
        WorkStatus::Done,
        WorkStatus::Aborted,
    ];

    /// Done and Aborted: no further staleness accrues.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Done | WorkStatus::Aborted)
    }

    /// Accepts the spellings issue trackers commonly use for each status.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        let status = match normalized.as_str() {
            "todo" | "to_do" | "open" | "backlog" | "new" | "selected_for_development" => Self::ToDo,
            "in_progress" | "doing" | "started" | "in_development" => Self::InProgress,
            "reviewing" | "review" | "in_review" | "code_review" | "qa" => Self::Reviewing,
            "done" | "closed" | "resolved" | "fixed" | "complete" | "completed" => Self::Done,
            "aborted" | "cancelled" | "canceled" | "won't_do" | "wont_do" | "rejected" => Self::Aborted,
            _ => return None,
        };
        Some(status)
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkStatus::ToDo => "To Do",
            WorkStatus::InProgress => "In Progress",
            WorkStatus::Reviewing => "Reviewing",
            WorkStatus::Done => "Done",
            WorkStatus::Aborted => "Aborted",
        }
    }
}

impl TryFrom<String> for WorkStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::from_label(&value).ok_or_else(|| format!("unknown work item status `{value}`"))
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub fn is_high(&self) -> bool {
        matches!(self, Priority::Highest | Priority::High)
    }
}

/// A parent task or subtask as fetched from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: String,
    pub title: String,
    pub status: WorkStatus,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub story_points: Option<f64>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub created: DateTime<FixedOffset>,
    pub updated: DateTime<FixedOffset>,
    pub status_entered: DateTime<FixedOffset>,
    #[serde(default)]
    pub due: Option<NaiveDate>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub reopened: bool,
    #[serde(default)]
    pub blocked: bool,
}

// Create
impl WorkItem {
    pub fn new(
        key: impl ToString,
        title: impl ToString,
        status: WorkStatus,
        at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            key: key.to_string(),
            title: title.to_string(),
            status,
            assignee: None,
            story_points: None,
            priority: None,
            created: at,
            updated: at,
            status_entered: at,
            due: None,
            parent: None,
            reopened: false,
            blocked: false,
        }
    }

    pub fn with_assignee(mut self, assignee: impl ToString) -> Self {
        self.assignee = Some(assignee.to_string());
        self
    }

    pub fn with_story_points(mut self, points: f64) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_status_entered(mut self, at: DateTime<FixedOffset>) -> Self {
        self.status_entered = at;
        self.updated = self.updated.max(at);
        self
    }

    pub fn with_due(mut self, due: NaiveDate) -> Self {
        self.due = Some(due);
        self
    }

    pub fn reopened(mut self) -> Self {
        self.reopened = true;
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }
}

impl WorkItem {
    pub fn is_done(&self) -> bool {
        self.status == WorkStatus::Done
    }

    pub fn is_unassigned(&self) -> bool {
        self.assignee.as_deref().map_or(true, |a| a.trim().is_empty())
    }

    /// Story points for capacity sums: unpointed counts as 1, negatives as 0.
    pub fn capacity_points(&self) -> f64 {
        match self.story_points {
            Some(points) if points.is_finite() => points.max(0.0),
            _ => 1.0,
        }
    }

    /// Time spent in the current status, `None` for terminal items.
    pub fn time_in_current_status(&self, now: &DateTime<FixedOffset>) -> Option<Duration> {
        if self.status.is_terminal() {
            return None;
        }
        Some(now.signed_duration_since(self.status_entered).max(Duration::zero()))
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.due.is_some_and(|due| due < today)
    }
}

/// A parent task and the subtasks it owns for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentItem {
    pub item: WorkItem,
    #[serde(default)]
    pub subtasks: Vec<WorkItem>,
}

impl ParentItem {
    pub fn new(item: WorkItem, subtasks: Vec<WorkItem>) -> Self {
        Self { item, subtasks }
    }

    /// Items this parent is measured by: its subtasks, or itself when it has none.
    pub fn units(&self) -> Box<dyn Iterator<Item = &WorkItem> + '_> {
        if self.subtasks.is_empty() {
            Box::new(std::iter::once(&self.item))
        } else {
            Box::new(self.subtasks.iter())
        }
    }

    pub fn totals(&self) -> Totals {
        Totals::from_items(self.units())
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
pub struct Totals {
    pub total: u64,
    pub done: u64,
    pub not_done: u64,
}

impl Totals {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a WorkItem>) -> Self {
        let (total, done) = items.into_iter().fold((0u64, 0u64), |(total, done), item| {
            (total + 1, done + u64::from(item.is_done()))
        });
        Self {
            total,
            done,
            not_done: total - done,
        }
    }

    fn add(self, other: Totals) -> Self {
        Self {
            total: self.total + other.total,
            done: self.done + other.done,
            not_done: self.not_done + other.not_done,
        }
    }
}

/// The sprint-scoped parents and their subtasks. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemSet {
    parents: Vec<ParentItem>,
    totals: Totals,
}

impl WorkItemSet {
    /// Keys must be unique; the only exception is a single subtask carrying
    /// its own parent's key.
    pub fn new(mut parents: Vec<ParentItem>) -> Result<Self> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (index, parent) in parents.iter().enumerate() {
            if seen.insert(&parent.item.key, index).is_some() {
                return Err(PipelineError::DuplicateWorkItem {
                    key: parent.item.key.clone(),
                });
            }
        }
        for (index, parent) in parents.iter().enumerate() {
            let mut derived_key_used = false;
            for subtask in &parent.subtasks {
                let duplicate = if subtask.key == parent.item.key {
                    std::mem::replace(&mut derived_key_used, true)
                } else {
                    seen.insert(&subtask.key, index).is_some()
                };
                if duplicate {
                    return Err(PipelineError::DuplicateWorkItem {
                        key: subtask.key.clone(),
                    });
                }
            }
        }

        for parent in parents.iter_mut() {
            let parent_key = parent.item.key.clone();
            for subtask in parent.subtasks.iter_mut() {
                if subtask.parent.is_none() {
                    subtask.parent = Some(parent_key.clone());
                }
            }
        }

        let totals = parents
            .iter()
            .map(ParentItem::totals)
            .fold(Totals::default(), Totals::add);
        Ok(Self { parents, totals })
    }

    pub fn from_json(json_str: &str) -> Result<Self> {
        let parents: Vec<ParentItem> = serde_json::from_str(json_str)?;
        Self::new(parents)
    }

    pub fn empty() -> Self {
        Self {
            parents: Vec::new(),
            totals: Totals::default(),
        }
    }

    pub fn parents(&self) -> &[ParentItem] {
        &self.parents
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The measured units: every subtask, plus parents that have none.
    pub fn units(&self) -> impl Iterator<Item = &WorkItem> {
        self.parents.iter().flat_map(ParentItem::units)
    }

    /// Every item, each parent's subtasks visited before the parent itself.
    pub fn all_items(&self) -> impl Iterator<Item = &WorkItem> {
        self.parents
            .iter()
            .flat_map(|p| p.subtasks.iter().chain(std::iter::once(&p.item)))
    }

    pub fn blocked_count(&self) -> u64 {
        self.units().filter(|i| i.blocked && !i.status.is_terminal()).count() as u64
    }
}
