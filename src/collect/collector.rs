use crate::collect::{FetchResult, MetricFetcher, MetricRegistry};
use crate::model::{FetchError, MetricKind, MetricValue, MetricsCollection, PipelineConfig, SprintScope};
use futures::{stream, FutureExt, StreamExt};
use indexmap::IndexMap;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs every registered fetcher on a fixed number of slots and waits for
/// all of them to settle. A failing fetcher only degrades its own metric.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    slots: usize,
    timeout: Duration,
}

impl MetricsCollector {
    pub fn new(slots: usize, timeout: Duration) -> Self {
        Self {
            slots: slots.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.worker_slots, config.fetch_timeout())
    }

    /// Must run inside a tokio runtime: each call is bounded by a tokio timer.
    pub async fn collect<C: Sync>(
        &self,
        client: &C,
        scope: &SprintScope,
        registry: &MetricRegistry<C>,
    ) -> MetricsCollection {
        let started = Instant::now();
        let values: IndexMap<MetricKind, MetricValue> = stream::iter(registry.iter())
            .map(|(kind, fetcher)| self.settle(*kind, fetcher.as_ref(), client, scope))
            .buffer_unordered(self.slots)
            .collect()
            .await;

        let collection = MetricsCollection::new(values);
        let unavailable = collection.unavailable();
        info!(
            sprint = %scope.label,
            registered = registry.len(),
            available = collection.len() - unavailable.len(),
            unavailable = unavailable.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "metrics collected"
        );
        collection
    }

    async fn settle<C: Sync>(
        &self,
        kind: MetricKind,
        fetcher: &dyn MetricFetcher<C>,
        client: &C,
        scope: &SprintScope,
    ) -> (MetricKind, MetricValue) {
        let started = Instant::now();
        let outcome = self.guarded_fetch(fetcher, client, scope).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let value = match outcome {
            Ok(metric) if metric.kind() == kind => {
                debug!(metric = %kind, elapsed_ms, "metric fetched");
                MetricValue::Present(metric)
            }
            Ok(metric) => {
                let err = FetchError::Malformed(format!("expected {kind}, received {}", metric.kind()));
                warn!(metric = %kind, elapsed_ms, error = %err, "metric unavailable");
                MetricValue::unavailable(err)
            }
            Err(err) => {
                warn!(metric = %kind, elapsed_ms, error = %err, "metric unavailable");
                MetricValue::unavailable(err)
            }
        };
        (kind, value)
    }

    async fn guarded_fetch<C: Sync>(
        &self,
        fetcher: &dyn MetricFetcher<C>,
        client: &C,
        scope: &SprintScope,
    ) -> FetchResult {
        // Building the future happens inside the guarded block too, so a
        // fetcher that panics before its first await is still contained.
        let call = AssertUnwindSafe(async move { fetcher.fetch(client, scope).await }).catch_unwind();
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(FetchError::Timeout(self.timeout)),
            Ok(Err(panic)) => Err(FetchError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
