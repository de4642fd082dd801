use crate::model::{FetchError, Metric, MetricKind, SprintScope};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use std::sync::Arc;

pub type FetchResult = std::result::Result<Metric, FetchError>;

/// One metric source. `C` is the tracker client (credentials, HTTP session)
/// threaded through every call rather than held globally.
pub trait MetricFetcher<C>: Send + Sync {
    fn kind(&self) -> MetricKind;

    fn fetch<'a>(&'a self, client: &'a C, scope: &'a SprintScope) -> BoxFuture<'a, FetchResult>;
}

/// Fetchers keyed by the metric kind they produce, one per kind.
pub struct MetricRegistry<C> {
    fetchers: IndexMap<MetricKind, Arc<dyn MetricFetcher<C>>>,
}

impl<C> MetricRegistry<C> {
    pub fn new() -> Self {
        Self {
            fetchers: IndexMap::new(),
        }
    }

    /// Registers `fetcher`, replacing any earlier fetcher of the same kind.
    pub fn register(&mut self, fetcher: impl MetricFetcher<C> + 'static) -> &mut Self {
        self.register_shared(Arc::new(fetcher))
    }

    pub fn register_shared(&mut self, fetcher: Arc<dyn MetricFetcher<C>>) -> &mut Self {
        self.fetchers.insert(fetcher.kind(), fetcher);
        self
    }

    pub fn with(mut self, fetcher: impl MetricFetcher<C> + 'static) -> Self {
        self.register(fetcher);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKind, &Arc<dyn MetricFetcher<C>>)> {
        self.fetchers.iter()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    /// Rebuilds the registry with every fetcher passed through `wrap`.
    pub fn map(self, mut wrap: impl FnMut(Arc<dyn MetricFetcher<C>>) -> Arc<dyn MetricFetcher<C>>) -> Self {
        let mut registry = Self::new();
        for (_, fetcher) in self.fetchers {
            registry.register_shared(wrap(fetcher));
        }
        registry
    }
}

impl<C> Default for MetricRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IssueCounts, VelocityHistory};
    use futures::FutureExt;

    struct Constant(Metric);

    impl MetricFetcher<()> for Constant {
        fn kind(&self) -> MetricKind {
            self.0.kind()
        }

        fn fetch<'a>(&'a self, _client: &'a (), _scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
            let metric = self.0.clone();
            async move { Ok(metric) }.boxed()
        }
    }

    #[test]
    fn later_registration_replaces_same_kind() {
        let registry = MetricRegistry::new()
            .with(Constant(Metric::IssueCounts(IssueCounts::default())))
            .with(Constant(Metric::Velocity(VelocityHistory::default())))
            .with(Constant(Metric::IssueCounts(IssueCounts {
                overdue: 3,
                ..IssueCounts::default()
            })));

        assert_eq!(registry.len(), 2);
        let kinds: Vec<_> = registry.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![MetricKind::IssueCounts, MetricKind::Velocity]);
    }
}
