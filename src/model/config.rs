use crate::model::{PipelineError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;

/// Tunables for one pipeline run. Every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: f64,

    #[serde(default = "default_narrative_timeout_secs")]
    pub narrative_timeout_secs: f64,

    #[serde(default)]
    pub evidence: EvidenceConfig,

    #[serde(default)]
    pub risk: RiskWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_slots: default_worker_slots(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            narrative_timeout_secs: default_narrative_timeout_secs(),
            evidence: EvidenceConfig::default(),
            risk: RiskWeights::default(),
        }
    }
}

// Create
impl PipelineConfig {
    pub fn from_config(path: &str) -> Result<Self> {
        let json_str = fs::read_to_string(path)?;
        Self::parse(&json_str)
    }

    pub fn parse(json_str: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json_str)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_slots == 0 {
            return Err(PipelineError::config("worker_slots must be at least 1"));
        }
        if timeout(self.fetch_timeout_secs).is_none() || timeout(self.narrative_timeout_secs).is_none() {
            return Err(PipelineError::config(
                "timeouts must be positive and representable as a duration",
            ));
        }
        self.evidence.validate()
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        timeout(self.fetch_timeout_secs)
            .unwrap_or_else(|| std::time::Duration::from_secs_f64(default_fetch_timeout_secs()))
    }

    pub fn narrative_timeout(&self) -> std::time::Duration {
        timeout(self.narrative_timeout_secs)
            .unwrap_or_else(|| std::time::Duration::from_secs_f64(default_narrative_timeout_secs()))
    }
}

fn timeout(secs: f64) -> Option<std::time::Duration> {
    std::time::Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

fn default_worker_slots() -> usize {
    6
}

fn default_fetch_timeout_secs() -> f64 {
    5.0
}

fn default_narrative_timeout_secs() -> f64 {
    12.0
}

/// Evidence selection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_stale_hours")]
    pub stale_after_hours: i64,

    #[serde(default = "default_stale_hours")]
    pub review_stale_after_hours: i64,

    #[serde(default = "default_recent_hours")]
    pub recent_window_hours: i64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            stale_after_hours: default_stale_hours(),
            review_stale_after_hours: default_stale_hours(),
            recent_window_hours: default_recent_hours(),
        }
    }
}

impl EvidenceConfig {
    fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(PipelineError::config("evidence.top_n must be at least 1"));
        }
        let thresholds = [
            ("stale_after_hours", self.stale_after_hours),
            ("review_stale_after_hours", self.review_stale_after_hours),
            ("recent_window_hours", self.recent_window_hours),
        ];
        for (name, value) in thresholds {
            if hours(value).is_none() {
                return Err(PipelineError::config(format!(
                    "evidence.{name} must be between 0 and {} hours",
                    Duration::MAX.num_hours()
                )));
            }
        }
        Ok(())
    }

    pub fn stale_after(&self) -> Duration {
        hours(self.stale_after_hours).unwrap_or_else(|| Duration::hours(default_stale_hours()))
    }

    pub fn review_stale_after(&self) -> Duration {
        hours(self.review_stale_after_hours).unwrap_or_else(|| Duration::hours(default_stale_hours()))
    }

    pub fn recent_window(&self) -> Duration {
        hours(self.recent_window_hours).unwrap_or_else(|| Duration::hours(default_recent_hours()))
    }
}

fn hours(value: i64) -> Option<Duration> {
    if value < 0 {
        return None;
    }
    Duration::try_hours(value)
}

fn default_top_n() -> usize {
    5
}

fn default_stale_hours() -> i64 {
    48
}

fn default_recent_hours() -> i64 {
    48
}

/// Weights of the risk percentage. Observed behaviour rather than derived
/// constants, so all of them are overridable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    /// Added when the window has closed below target.
    #[serde(default = "default_unreachable")]
    pub unreachable: f64,

    /// Scales the relative shortfall against expected pace.
    #[serde(default = "default_pace_gap")]
    pub pace_gap: f64,

    #[serde(default = "default_per_overdue")]
    pub per_overdue: f64,

    #[serde(default = "default_per_blocked")]
    pub per_blocked: f64,

    #[serde(default = "default_per_reopened")]
    pub per_reopened: f64,

    #[serde(default = "default_per_unassigned")]
    pub per_unassigned: f64,

    /// Upper bound of any single counter's contribution.
    #[serde(default = "default_counter_cap")]
    pub counter_cap: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            unreachable: default_unreachable(),
            pace_gap: default_pace_gap(),
            per_overdue: default_per_overdue(),
            per_blocked: default_per_blocked(),
            per_reopened: default_per_reopened(),
            per_unassigned: default_per_unassigned(),
            counter_cap: default_counter_cap(),
        }
    }
}

fn default_unreachable() -> f64 {
    100.0
}

fn default_pace_gap() -> f64 {
    60.0
}

fn default_per_overdue() -> f64 {
    5.0
}

fn default_per_blocked() -> f64 {
    4.0
}

fn default_per_reopened() -> f64 {
    3.0
}

fn default_per_unassigned() -> f64 {
    2.0
}

fn default_counter_cap() -> f64 {
    25.0
}
