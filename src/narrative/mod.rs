mod context;
mod generator;

pub use context::{Bottleneck, BusiestAssignee, NarrativeContext, UnavailableMetric, VelocitySummary};
pub use generator::{narrate, Narrative, NarrativeGenerator, NarrativeSource};
