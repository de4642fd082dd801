mod config;
mod metric;
mod result;
mod sprint;
mod work_item;

pub use config::{EvidenceConfig, PipelineConfig, RiskWeights};
pub use metric::{
    AssigneeLoad, AssigneeWorkload, BurndownPoint, BurndownSeries, IssueCounts, ItemStatusTimes,
    Metric, MetricKind, MetricValue, MetricsCollection, StatusDistribution, TimeInStatus,
    VelocityHistory, VelocitySample, UNASSIGNED_LABEL,
};
pub use result::{FetchError, NarrativeError, PipelineError, Result};
pub use sprint::{Sprint, SprintScope, SprintWindow};
pub use work_item::{ParentItem, Priority, Totals, WorkItem, WorkItemSet, WorkStatus};
