use crate::collect::{FetchResult, MetricFetcher};
use crate::model::{MetricKind, SprintScope};
use futures::future::BoxFuture;
use futures::FutureExt;
use indicatif::ProgressBar;
use std::sync::Arc;

/// Reports the state of the wrapped fetcher on a spinner.
pub struct ProgressFetcher<C> {
    inner: Arc<dyn MetricFetcher<C>>,
    pb: ProgressBar,
}

impl<C> ProgressFetcher<C> {
    pub fn new(inner: Arc<dyn MetricFetcher<C>>, pb: ProgressBar) -> Self {
        Self { inner, pb }
    }
}

impl<C: Sync> MetricFetcher<C> for ProgressFetcher<C> {
    fn kind(&self) -> MetricKind {
        self.inner.kind()
    }

    fn fetch<'a>(&'a self, client: &'a C, scope: &'a SprintScope) -> BoxFuture<'a, FetchResult> {
        async move {
            let kind = self.inner.kind();
            self.pb.set_message(format!("Fetching {kind} ..."));
            let result = self.inner.fetch(client, scope).await;
            match &result {
                Ok(_) => self.pb.finish_with_message(format!("✅ Fetched {kind}")),
                Err(err) => self.pb.finish_with_message(format!("⚠️ {kind} unavailable: {err}")),
            }
            result
        }
        .boxed()
    }
}
