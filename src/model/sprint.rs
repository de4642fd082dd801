use crate::model::{PipelineError, Result};
use chrono::{DateTime, Duration, FixedOffset};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{from_str, Value};
use std::fs;

#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct Sprint {
    pub name: String,
    pub id: u64,
    pub board: u64,
    pub since: DateTime<FixedOffset>,
    pub until: DateTime<FixedOffset>,
}

// Create
impl Sprint {
    pub fn from_config(path: &str) -> Result<Vec<Self>> {
        let json_str = fs::read_to_string(path)?;
        Self::parse(&json_str)
    }

    pub fn new(
        name: impl ToString,
        id: u64,
        board: u64,
        since: DateTime<FixedOffset>,
        until: DateTime<FixedOffset>,
    ) -> Sprint {
        Self {
            name: name.to_string(),
            id,
            board,
            since,
            until,
        }
    }

    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        *at >= self.since && *at <= self.until
    }
}

// Parser
impl Sprint {
    fn parse(json_str: &str) -> Result<Vec<Self>> {
        let elements: IndexMap<String, Value> = from_str(json_str)?;
        let mut result = Vec::new();
        for (name, details) in elements {
            let Some(id) = details["id"].as_u64() else {
                return Err(PipelineError::config(format!("Sprint `{name}`: missing 'id' field")));
            };
            let Some(board) = details["board"].as_u64() else {
                return Err(PipelineError::config(format!("Sprint `{name}`: missing 'board' field")));
            };
            let since = parse_datetime(&name, "since", &details)?;
            let until = parse_datetime(&name, "until", &details)?;
            result.push(Self::new(name, id, board, since, until));
        }
        Ok(result)
    }
}

fn parse_datetime(name: &str, field: &str, details: &Value) -> Result<DateTime<FixedOffset>> {
    let Some(raw) = details[field].as_str() else {
        return Err(PipelineError::config(format!("Sprint `{name}`: missing '{field}' field")));
    };
    DateTime::parse_from_rfc3339(raw)
        .map_err(|_| PipelineError::config(format!("Sprint `{name}`: not a valid date time: {raw}")))
}

/// Fixed start/end pair bounding a sprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SprintWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl SprintWindow {
    /// Whole calendar days left, rounded up; zero once the window closed.
    pub fn remaining_days(&self, now: &DateTime<FixedOffset>) -> u64 {
        let left = self.end.signed_duration_since(*now);
        if left <= Duration::zero() {
            return 0;
        }
        let day = Duration::days(1).num_seconds();
        let secs = left.num_seconds();
        ((secs + day - 1) / day).max(0) as u64
    }

    /// Share of the window already elapsed, clamped to [0, 1].
    pub fn elapsed_fraction(&self, now: &DateTime<FixedOffset>) -> f64 {
        let length = self.end.signed_duration_since(self.start).num_seconds();
        if length <= 0 {
            return 1.0;
        }
        let elapsed = now.signed_duration_since(self.start).num_seconds();
        (elapsed as f64 / length as f64).clamp(0.0, 1.0)
    }
}

/// The resolved board/sprint a run operates on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintScope {
    pub board_id: u64,
    pub sprint_id: u64,
    pub label: String,
    pub window: SprintWindow,
    pub target_rate: f64,
}

impl SprintScope {
    pub fn new(
        board_id: u64,
        sprint_id: u64,
        label: impl ToString,
        window: SprintWindow,
        target_rate: f64,
    ) -> Result<Self> {
        if window.end <= window.start {
            return Err(PipelineError::scope(format!(
                "window ends ({}) before it starts ({})",
                window.end, window.start
            )));
        }
        if !(target_rate > 0.0 && target_rate <= 1.0) {
            return Err(PipelineError::scope(format!(
                "target completion rate {target_rate} is outside (0, 1]"
            )));
        }
        Ok(Self {
            board_id,
            sprint_id,
            label: label.to_string(),
            window,
            target_rate,
        })
    }

    /// Picks the sprint named `selector`, or else the one running at `now`.
    pub fn resolve(
        sprints: &[Sprint],
        selector: Option<&str>,
        now: &DateTime<FixedOffset>,
        target_rate: f64,
    ) -> Result<Self> {
        let sprint = match selector {
            Some(name) => sprints
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| PipelineError::scope(format!("no sprint named `{name}`")))?,
            None => sprints
                .iter()
                .filter(|s| s.contains(now))
                .max_by_key(|s| s.since)
                .ok_or_else(|| PipelineError::scope(format!("no sprint is active at {now}")))?,
        };
        let window = SprintWindow {
            start: sprint.since,
            end: sprint.until,
        };
        Self::new(sprint.board, sprint.id, &sprint.name, window, target_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn window() -> SprintWindow {
        SprintWindow {
            start: at("2024-05-01T09:00:00+09:00"),
            end: at("2024-05-15T09:00:00+09:00"),
        }
    }

    #[test]
    fn parses_sprints_in_file_order() {
        let json = r#"{
            "Sprint 2": {"id": 12, "board": 3, "since": "2024-05-15T09:00:00+09:00", "until": "2024-05-29T09:00:00+09:00"},
            "Sprint 1": {"id": 11, "board": 3, "since": "2024-05-01T09:00:00+09:00", "until": "2024-05-15T09:00:00+09:00"}
        }"#;
        let sprints = Sprint::parse(json).unwrap();
        assert_eq!(sprints.len(), 2);
        assert_eq!(sprints[0].name, "Sprint 2");
        assert_eq!(sprints[1].id, 11);
    }

    #[test]
    fn rejects_sprint_without_until() {
        let json = r#"{"S": {"id": 1, "board": 1, "since": "2024-05-01T09:00:00+09:00"}}"#;
        assert!(matches!(Sprint::parse(json), Err(PipelineError::Config(_))));
    }

    #[test]
    fn remaining_days_rounds_up_and_never_goes_negative() {
        let w = window();
        assert_eq!(w.remaining_days(&at("2024-05-14T10:00:00+09:00")), 1);
        assert_eq!(w.remaining_days(&at("2024-05-10T09:00:00+09:00")), 5);
        assert_eq!(w.remaining_days(&at("2024-05-15T09:00:00+09:00")), 0);
        assert_eq!(w.remaining_days(&at("2024-06-30T09:00:00+09:00")), 0);
    }

    #[test]
    fn elapsed_fraction_is_clamped() {
        let w = window();
        assert_eq!(w.elapsed_fraction(&at("2024-04-01T00:00:00+09:00")), 0.0);
        assert_eq!(w.elapsed_fraction(&at("2024-05-08T09:00:00+09:00")), 0.5);
        assert_eq!(w.elapsed_fraction(&at("2024-07-01T00:00:00+09:00")), 1.0);
    }

    #[test]
    fn resolve_prefers_named_then_active_sprint() {
        let sprints = vec![
            Sprint::new("Sprint 1", 11, 3, at("2024-05-01T09:00:00+09:00"), at("2024-05-15T09:00:00+09:00")),
            Sprint::new("Sprint 2", 12, 3, at("2024-05-15T09:00:00+09:00"), at("2024-05-29T09:00:00+09:00")),
        ];
        let now = at("2024-05-20T09:00:00+09:00");

        let active = SprintScope::resolve(&sprints, None, &now, 0.8).unwrap();
        assert_eq!(active.sprint_id, 12);

        let named = SprintScope::resolve(&sprints, Some("Sprint 1"), &now, 0.8).unwrap();
        assert_eq!(named.sprint_id, 11);
    }

    #[test]
    fn resolve_fails_when_nothing_is_active() {
        let sprints = vec![Sprint::new(
            "Sprint 1",
            11,
            3,
            at("2024-05-01T09:00:00+09:00"),
            at("2024-05-15T09:00:00+09:00"),
        )];
        let now = at("2024-08-01T09:00:00+09:00");
        let err = SprintScope::resolve(&sprints, None, &now, 0.8).unwrap_err();
        assert!(matches!(err, PipelineError::ScopeResolution(_)));
    }

    #[test]
    fn scope_rejects_invalid_target_and_inverted_window() {
        let w = window();
        assert!(SprintScope::new(1, 1, "S", w, 0.0).is_err());
        assert!(SprintScope::new(1, 1, "S", w, 1.5).is_err());
        let inverted = SprintWindow { start: w.end, end: w.start };
        assert!(SprintScope::new(1, 1, "S", inverted, 0.8).is_err());
        assert!(SprintScope::new(1, 1, "S", w, 1.0).is_ok());
    }
}
