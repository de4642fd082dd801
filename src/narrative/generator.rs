use crate::model::NarrativeError;
use crate::narrative::NarrativeContext;
use futures::future::BoxFuture;
use std::time::Duration;
use tracing::{info, warn};

/// External text generator, e.g. a language-model client. Optional: the
/// pipeline always has the fallback summary to use instead.
pub trait NarrativeGenerator: Send + Sync {
    fn generate<'a>(&'a self, context: &'a NarrativeContext) -> BoxFuture<'a, Result<String, NarrativeError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrativeSource {
    Generated,
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub text: String,
    pub source: NarrativeSource,
}

impl Narrative {
    fn fallback(context: &NarrativeContext, reason: impl ToString) -> Self {
        Self {
            text: context.fallback_summary(),
            source: NarrativeSource::Fallback {
                reason: reason.to_string(),
            },
        }
    }
}

/// Asks `generator` for the narrative, bounded by `timeout`. Any failure,
/// timeout or blank answer yields the fallback summary instead.
pub async fn narrate(
    context: &NarrativeContext,
    generator: Option<&dyn NarrativeGenerator>,
    timeout: Duration,
) -> Narrative {
    let Some(generator) = generator else {
        info!(sprint = %context.sprint, "no narrative generator configured, using summary");
        return Narrative::fallback(context, "no generator configured");
    };

    let outcome = match tokio::time::timeout(timeout, generator.generate(context)).await {
        Err(_) => Err(NarrativeError::Timeout(timeout)),
        Ok(Ok(text)) if text.trim().is_empty() => Err(NarrativeError::Empty),
        Ok(result) => result,
    };
    match outcome {
        Ok(text) => Narrative {
            text,
            source: NarrativeSource::Generated,
        },
        Err(err) => {
            warn!(sprint = %context.sprint, error = %err, "narrative generation failed, using summary");
            Narrative::fallback(context, err)
        }
    }
}
