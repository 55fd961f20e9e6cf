use anyhow::{anyhow, Context};
use clap::Parser;
use pawpose_lib::core::config::Config;
use pawpose_lib::core::image_acquisition::HttpImageSource;
use pawpose_lib::core::ml_models::{ModelInfo, ModelManager, ModelSource};
use pawpose_lib::core::pipeline::PipelineState;
use pawpose_lib::models::pipeline::{OrderingPolicy, PipelineSnapshot};
use pawpose_lib::platform::pose::{DefaultPoseModel, PoseModel};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Poll a dog image corpus and print the joints found in each image
#[derive(Debug, Parser)]
#[command(name = "pawpose", version, about)]
struct Cli {
    /// Settings file (defaults to ~/.pawpose/config/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Corpus base URL; image URLs are `{base}{index}.jpg{suffix}`
    #[arg(long)]
    base_url: Option<String>,

    /// First index to poll
    #[arg(long)]
    start_index: Option<u32>,

    /// Last index to poll
    #[arg(long)]
    max_index: Option<u32>,

    /// Seconds between ticks
    #[arg(long)]
    interval: Option<f64>,

    /// Ticks processed concurrently
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// sequence_guard or last_write_wins
    #[arg(long)]
    ordering: Option<OrderingPolicy>,

    /// Pose model file or http(s) URL; URLs are downloaded into the model cache
    #[arg(long)]
    model: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(start_index) = self.start_index {
            config.start_index = start_index;
        }
        if let Some(max_index) = self.max_index {
            config.max_index = max_index;
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(max_in_flight) = self.max_in_flight {
            config.max_in_flight = max_in_flight;
        }
        if let Some(ordering) = self.ordering {
            config.ordering = ordering;
        }
    }
}

/// Copy or download `--model` into the cache and point the config at it
async fn resolve_model(location: &str, config: &mut Config) -> anyhow::Result<()> {
    let cache_dir = match &config.model_cache_dir {
        Some(dir) => dir.clone(),
        None => Config::data_dir()
            .map_err(|e| anyhow!(e.to_string()))?
            .join("models"),
    };

    let manager = ModelManager::new(cache_dir).map_err(|e| anyhow!(e))?;
    let model = ModelInfo::from_source(ModelSource::from_location(location)).map_err(|e| anyhow!(e))?;
    let path = manager
        .ensure_model(&model)
        .await
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("Failed to fetch model {}", location))?;

    config.model_path = Some(path);
    Ok(())
}

fn print_snapshot(snapshot: &PipelineSnapshot) {
    let url = snapshot.url.as_deref().unwrap_or("-");
    info!(
        index = ?snapshot.index,
        joints = snapshot.current_observation.len(),
        "{}",
        url
    );

    for joint in snapshot.current_observation.sorted() {
        println!(
            "{}: {:.3}, {:.3} ({:.2})",
            joint.name, joint.position.x, joint.position.y, joint.confidence
        );
    }
}

async fn display(mut rx: watch::Receiver<PipelineSnapshot>) {
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        print_snapshot(&snapshot);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

    cli.apply(&mut config);
    if let Some(location) = &cli.model {
        resolve_model(location, &mut config).await?;
    }
    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let source = HttpImageSource::from_config(&config)?;
    let model = DefaultPoseModel::new(&config.pose_config())?;
    let state = Arc::new(PipelineState::new(config.ordering));

    let viewer = tokio::spawn(display(state.subscribe()));

    // The viewer ends once the state is dropped and the last snapshot is shown
    let summary = pawpose_lib::run(&config, Arc::new(source), Arc::new(model), state).await?;
    if let Err(e) = viewer.await {
        tracing::warn!("Viewer task ended abnormally: {}", e);
    }

    info!(
        triggered = summary.triggered,
        applied = summary.writer.applied,
        stale = summary.writer.stale,
        final_cursor = summary.final_cursor,
        "Polling finished"
    );

    Ok(())
}
