use chrono::{DateTime, FixedOffset, Local};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar};
use serde::de::DeserializeOwned;
use sprint_pulse::collect::snapshot::{snapshot_registry, ProjectTotals, Snapshot};
use sprint_pulse::collect::MetricFetcher;
use sprint_pulse::model::{
    PipelineConfig, PipelineError, Result, Sprint, SprintScope, VelocitySample, WorkItemSet,
};
use sprint_pulse::report::markdown::MarkdownReport;
use sprint_pulse::utils::{MultiProgressNew, ProgressFetcher, ProgressStyleTemplate};
use sprint_pulse::Pipeline;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
struct Args {
    #[arg(long = "sprints", default_value = "sprints.json")]
    sprints_path: String,
    #[arg(long = "items", default_value = "items.json")]
    items_path: String,
    /// Closed sprints, most recent first, for the velocity panel.
    #[arg(long = "velocity")]
    velocity_path: Option<String>,
    /// Project-wide open/total counts.
    #[arg(long = "project")]
    project_path: Option<String>,
    /// Sprint name; defaults to the sprint running now.
    #[arg(long = "sprint")]
    sprint: Option<String>,
    #[arg(long = "config")]
    config_path: Option<String>,
    #[arg(long = "target", default_value_t = 0.8)]
    target: f64,
    /// Evaluate as of this RFC 3339 time instead of the current time.
    #[arg(long = "now")]
    now: Option<String>,
    #[arg(long = "out", default_value = "reports")]
    out_dir: PathBuf,
    /// Also write the narrative context as JSON.
    #[arg(long = "context_json")]
    context_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    run(&args).await
}

async fn run(args: &Args) -> Result<()> {
    let now = match &args.now {
        Some(raw) => parse_now(raw)?,
        None => Local::now().fixed_offset(),
    };

    let (sprints, items, config) = parse_configs(args).await;
    let scope = SprintScope::resolve(&sprints?, args.sprint.as_deref(), &now, args.target)?;
    let pipeline = Pipeline::new(config?);

    let mut snapshot = Snapshot::new(items?, now);
    if let Some(path) = &args.velocity_path {
        snapshot = snapshot.with_velocity(read_json::<Vec<VelocitySample>>(path)?);
    }
    if let Some(path) = &args.project_path {
        snapshot = snapshot.with_project(read_json::<ProjectTotals>(path)?);
    }

    let multi_progress = MultiProgress::new();
    multi_progress.println(format!("# {}", scope.label))?;
    let mut fetch_pbs = Vec::new();
    let registry = snapshot_registry().map(|fetcher| {
        let pb = multi_progress.add_spinner(
            ProgressStyleTemplate::with_elapsed(),
            format!("Waiting {}", fetcher.kind()),
        );
        fetch_pbs.push(pb.clone());
        Arc::new(ProgressFetcher::new(fetcher, pb)) as Arc<dyn MetricFetcher<Snapshot>>
    });

    let context = pipeline
        .run(&snapshot, &scope, &snapshot.items, &registry, &now)
        .await;
    for pb in fetch_pbs.iter().filter(|pb| !pb.is_finished()) {
        pb.abandon_with_message("⚠️ Gave up waiting");
    }

    let narrative = pipeline.narrate(&context, None).await;
    let report_path = context.report_create(&narrative.text, &args.out_dir)?;
    multi_progress.println(format!("✅ Report written to `{}`", report_path.display()))?;

    if let Some(path) = &args.context_json {
        fs::write(path, serde_json::to_string_pretty(&context)?)?;
        multi_progress.println(format!("✅ Context written to `{}`", path.display()))?;
    }
    Ok(())
}

async fn parse_configs(
    args: &Args,
) -> (Result<Vec<Sprint>>, Result<WorkItemSet>, Result<PipelineConfig>) {
    async fn parse_config<T, F>(path: &str, pb: &ProgressBar, parser: F) -> Result<T>
    where
        F: FnOnce(&str) -> Result<T>,
    {
        pb.set_message(format!("Read file `{}` ...", path));
        let parsed = parser(path);
        match &parsed {
            Ok(_) => pb.finish_with_message(format!("✅ Completed parsing file `{}`", path)),
            Err(err) => pb.abandon_with_message(format!("❌ Could not parse `{}`: {}", path, err)),
        }
        parsed
    }

    let multi_progress = MultiProgress::default();
    let sprints_pb = multi_progress.add_with_style(
        ProgressBar::no_length(),
        ProgressStyleTemplate::only_message(),
    );
    let items_pb = multi_progress.add_with_style(
        ProgressBar::no_length(),
        ProgressStyleTemplate::only_message(),
    );
    let config_pb = multi_progress.add_with_style(
        ProgressBar::no_length(),
        ProgressStyleTemplate::only_message(),
    );

    let config = async {
        match &args.config_path {
            Some(path) => parse_config(path, &config_pb, PipelineConfig::from_config).await,
            None => {
                config_pb.finish_with_message("✅ Using default pipeline settings");
                Ok(PipelineConfig::default())
            }
        }
    };
    futures::join!(
        parse_config(&args.sprints_path, &sprints_pb, Sprint::from_config),
        parse_config(&args.items_path, &items_pb, |path| {
            WorkItemSet::from_json(&fs::read_to_string(path)?)
        }),
        config,
    )
}

fn read_json<T: DeserializeOwned>(path: &str) -> Result<T> {
    let json_str = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json_str)?)
}

fn parse_now(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|_| PipelineError::config(format!("--now: not a valid date time: {raw}")))
}
