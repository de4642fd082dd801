mod collector;
mod fetcher;
pub mod snapshot;

pub use collector::MetricsCollector;
pub use fetcher::{FetchResult, MetricFetcher, MetricRegistry};
