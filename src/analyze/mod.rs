mod evidence;
mod kpi;
mod model;

pub use evidence::EvidenceRanker;
pub use kpi::{risk_counters, target_count, KpiEngine};
pub use model::{EvidenceItem, EvidenceReason, KpiSet, RiskContribution, RiskCounters, RiskFactor};
pub(crate) use model::days;
