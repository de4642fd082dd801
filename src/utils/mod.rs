mod multi_progress;
mod progress_fetcher;
mod progress_style;

pub use multi_progress::MultiProgressNew;
pub use progress_fetcher::ProgressFetcher;
pub use progress_style::ProgressStyleTemplate;
