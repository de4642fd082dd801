use crate::analyze::{EvidenceRanker, KpiEngine};
use crate::collect::{MetricRegistry, MetricsCollector};
use crate::model::{PipelineConfig, SprintScope, WorkItemSet};
use crate::narrative::{narrate, Narrative, NarrativeContext, NarrativeGenerator};
use chrono::{DateTime, FixedOffset};
use tracing::info;

/// One sprint report run: collect metrics, derive KPIs and evidence, then
/// assemble the narrative context. Once a scope and work item set exist the
/// run cannot fail; degraded metrics show up as data.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    collector: MetricsCollector,
    kpis: KpiEngine,
    ranker: EvidenceRanker,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            collector: MetricsCollector::from_config(&config),
            kpis: KpiEngine::new(config.risk.clone()),
            ranker: EvidenceRanker::new(config.evidence.clone()),
            config,
        }
    }

    pub async fn run<C: Sync>(
        &self,
        client: &C,
        scope: &SprintScope,
        items: &WorkItemSet,
        registry: &MetricRegistry<C>,
        now: &DateTime<FixedOffset>,
    ) -> NarrativeContext {
        let metrics = self.collector.collect(client, scope, registry).await;
        let kpis = self.kpis.compute(items, scope, &metrics, now);
        let evidence = self.ranker.rank(items, &metrics, now);
        let context = NarrativeContext::build(scope, items, kpis, &metrics, evidence);

        info!(
            sprint = %scope.label,
            completion_rate = context.kpis.completion_rate,
            risk_percent = context.kpis.risk_percent,
            evidence = context.evidence.len(),
            unavailable = context.unavailable.len(),
            "sprint context assembled"
        );
        context
    }

    pub async fn narrate(
        &self,
        context: &NarrativeContext,
        generator: Option<&dyn NarrativeGenerator>,
    ) -> Narrative {
        narrate(context, generator, self.config.narrative_timeout()).await
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
