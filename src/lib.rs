pub mod analyze;
pub mod collect;
pub mod model;
pub mod narrative;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use pipeline::Pipeline;
