pub mod core;
pub mod models;
pub mod platform;

use crate::core::config::Config;
use crate::core::image_acquisition::ImageSource;
use crate::core::pipeline::{Pipeline, PipelineState, WorkerPool};
use crate::core::pose_detector::PoseDetector;
use crate::core::scheduler::PollingScheduler;
use crate::models::pipeline::{RunError, RunSummary};
use crate::platform::pose::PoseModel;
use std::sync::Arc;
use tracing::info;

/// Poll the corpus from `config.start_index` through `config.max_index`,
/// publishing every completed tick into `state`
///
/// Returns once the cursor has passed the last index and every in-flight
/// tick has been written. `config` is validated first; nothing is polled
/// when it is rejected.
pub async fn run(
    config: &Config,
    source: Arc<dyn ImageSource>,
    model: Arc<dyn PoseModel>,
    state: Arc<PipelineState>,
) -> Result<RunSummary, RunError> {
    config
        .validate()
        .map_err(|e| RunError::InvalidConfig(e.to_string()))?;

    let detector = Arc::new(PoseDetector::new(model, config.min_joint_confidence));
    info!(
        model = %detector.model_info(),
        workers = config.max_in_flight,
        ordering = %config.ordering,
        "Pipeline ready"
    );

    let pipeline = Arc::new(Pipeline::new(source, detector));
    let pool = WorkerPool::start(pipeline, state, config.max_in_flight, config.queue_depth);

    let mut scheduler = PollingScheduler::from_config(config);
    let triggered = scheduler.run(&pool.sender()).await;
    let writer = pool.shutdown().await;

    Ok(RunSummary {
        triggered,
        final_cursor: scheduler.cursor().current(),
        writer,
    })
}
