// Pipeline - runs ticks (fetch -> convert -> detect) and publishes their results

use crate::core::image_acquisition::ImageSource;
use crate::core::pixel_buffer;
use crate::core::pose_detector::PoseDetector;
use crate::models::pipeline::{
    OrderingPolicy, PipelineSnapshot, TickError, TickJob, TickResult, UpdateOutcome, WriterStats,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

// ==============================================================================
// Published State
// ==============================================================================

/// Latest image and joints, as seen by the display layer
///
/// Both fields are replaced together; readers never observe an image paired
/// with another tick's joints.
pub struct PipelineState {
    tx: watch::Sender<PipelineSnapshot>,
    policy: OrderingPolicy,
}

impl PipelineState {
    pub fn new(policy: OrderingPolicy) -> Self {
        let (tx, _rx) = watch::channel(PipelineSnapshot::default());
        Self { tx, policy }
    }

    pub fn policy(&self) -> OrderingPolicy {
        self.policy
    }

    /// Offer a completed tick
    ///
    /// Under [`OrderingPolicy::SequenceGuard`] a tick older than the last
    /// applied one is discarded. Repeating an update is a no-op.
    pub fn update(&self, tick: TickResult) -> UpdateOutcome {
        let policy = self.policy;
        let mut outcome = UpdateOutcome::Unchanged;

        self.tx.send_if_modified(|current| {
            if policy == OrderingPolicy::SequenceGuard
                && current.sequence.is_some_and(|last| tick.sequence < last)
            {
                outcome = UpdateOutcome::Stale;
                return false;
            }

            let next = PipelineSnapshot::from_tick(tick);
            if *current == next {
                return false;
            }

            *current = next;
            outcome = UpdateOutcome::Applied;
            true
        });

        outcome
    }

    /// Current snapshot
    pub fn read(&self) -> PipelineSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every applied update
    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.tx.subscribe()
    }
}

/// Spawn the single task allowed to write `state`
///
/// Runs until every sender of `rx` is dropped.
pub fn spawn_state_writer(
    state: Arc<PipelineState>,
    mut rx: mpsc::Receiver<TickResult>,
) -> JoinHandle<WriterStats> {
    tokio::spawn(async move {
        let mut stats = WriterStats::default();

        while let Some(tick) = rx.recv().await {
            let (sequence, index) = (tick.sequence, tick.index);
            let outcome = state.update(tick);
            stats.record(outcome);

            match outcome {
                UpdateOutcome::Applied => debug!(sequence, %index, "Published tick"),
                UpdateOutcome::Unchanged => debug!(sequence, %index, "Tick matches published state"),
                UpdateOutcome::Stale => debug!(sequence, %index, "Discarded out-of-order tick"),
            }
        }

        stats
    })
}

// ==============================================================================
// Tick Runner
// ==============================================================================

/// Acquisition, conversion, and detection for one corpus index
pub struct Pipeline {
    source: Arc<dyn ImageSource>,
    detector: Arc<PoseDetector>,
}

impl Pipeline {
    pub fn new(source: Arc<dyn ImageSource>, detector: Arc<PoseDetector>) -> Self {
        Self { source, detector }
    }

    /// Run one tick. Errors mean the tick is dropped; detection failures are
    /// not errors and produce an empty observation instead.
    pub async fn run_tick(&self, job: TickJob) -> Result<TickResult, TickError> {
        let index = job.index;
        let image = self.source.fetch(index).await?;
        let buffer = pixel_buffer::convert(&image)?;
        let observation = self.detector.detect(buffer).await;

        Ok(TickResult {
            sequence: job.sequence,
            index,
            url: self.source.url_for(index),
            image: Arc::new(image),
            observation,
            completed_at: chrono::Utc::now().timestamp_millis(),
        })
    }
}

// ==============================================================================
// Worker Pool
// ==============================================================================

/// Fixed set of workers draining a bounded job queue into the state writer
pub struct WorkerPool {
    jobs: mpsc::Sender<TickJob>,
    workers: Vec<JoinHandle<()>>,
    writer: JoinHandle<WriterStats>,
}

impl WorkerPool {
    pub fn start(
        pipeline: Arc<Pipeline>,
        state: Arc<PipelineState>,
        worker_count: usize,
        queue_depth: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (jobs, job_rx) = mpsc::channel::<TickJob>(queue_depth.max(1));
        let (result_tx, result_rx) = mpsc::channel::<TickResult>(worker_count);

        let writer = spawn_state_writer(state, result_rx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let workers = (0..worker_count)
            .map(|worker| {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    Self::work(worker, job_rx, result_tx, pipeline).await;
                })
            })
            .collect();

        Self {
            jobs,
            workers,
            writer,
        }
    }

    /// Queue handle; `send` waits while the queue is full
    pub fn sender(&self) -> mpsc::Sender<TickJob> {
        self.jobs.clone()
    }

    /// Stop taking jobs, let queued and in-flight ticks finish, and return
    /// the writer's counts
    pub async fn shutdown(self) -> WriterStats {
        drop(self.jobs);

        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!("Pipeline worker ended abnormally: {}", e);
            }
        }

        match self.writer.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("State writer ended abnormally: {}", e);
                WriterStats::default()
            }
        }
    }

    async fn work(
        worker: usize,
        job_rx: Arc<Mutex<mpsc::Receiver<TickJob>>>,
        result_tx: mpsc::Sender<TickResult>,
        pipeline: Arc<Pipeline>,
    ) {
        loop {
            let job = job_rx.lock().await.recv().await;
            let Some(job) = job else {
                break; // Queue closed
            };

            debug!(worker, sequence = job.sequence, index = %job.index, "Tick started");

            match pipeline.run_tick(job).await {
                Ok(result) => {
                    if result_tx.send(result).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(sequence = job.sequence, index = %job.index, "Dropped tick: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::{fake_tick, FakeCorpus, FixedModel, SlowCorpus};
    use crate::models::frame::CorpusIndex;

    fn pipeline(corpus: FakeCorpus) -> Arc<Pipeline> {
        pipeline_over(Arc::new(corpus))
    }

    fn pipeline_over(source: Arc<dyn ImageSource>) -> Arc<Pipeline> {
        let detector = Arc::new(PoseDetector::new(Arc::new(FixedModel), 0.0));
        Arc::new(Pipeline::new(source, detector))
    }

    #[test]
    fn test_update_is_idempotent() {
        let state = PipelineState::new(OrderingPolicy::SequenceGuard);
        let tick = fake_tick(1, 5);

        assert_eq!(state.update(tick.clone()), UpdateOutcome::Applied);
        let once = state.read();
        assert_eq!(state.update(tick), UpdateOutcome::Unchanged);
        assert_eq!(state.read(), once);
        assert_eq!(once.index, Some(CorpusIndex(5)));
    }

    #[test]
    fn test_sequence_guard_discards_stale() {
        let state = PipelineState::new(OrderingPolicy::SequenceGuard);
        state.update(fake_tick(2, 2));

        assert_eq!(state.update(fake_tick(1, 1)), UpdateOutcome::Stale);
        assert_eq!(state.read().index, Some(CorpusIndex(2)));

        assert_eq!(state.update(fake_tick(3, 3)), UpdateOutcome::Applied);
        assert_eq!(state.read().sequence, Some(3));
    }

    #[test]
    fn test_last_write_wins_applies_everything() {
        let state = PipelineState::new(OrderingPolicy::LastWriteWins);
        state.update(fake_tick(2, 2));
        assert_eq!(state.update(fake_tick(1, 1)), UpdateOutcome::Applied);
        assert_eq!(state.read().index, Some(CorpusIndex(1)));
    }

    #[test]
    fn test_image_and_joints_replaced_together() {
        let state = PipelineState::new(OrderingPolicy::SequenceGuard);
        let tick = fake_tick(4, 9);
        let image = tick.image.clone();
        state.update(tick);

        let snapshot = state.read();
        assert_eq!(snapshot.current_image, Some(image));
        assert!(snapshot.current_observation.contains("nose"));
        assert_eq!(snapshot.url.as_deref(), Some("fake://9.jpg"));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let state = PipelineState::new(OrderingPolicy::SequenceGuard);
        let mut rx = state.subscribe();

        state.update(fake_tick(1, 1));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().index, Some(CorpusIndex(1)));

        // A repeat does not wake readers
        state.update(fake_tick(1, 1));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_writer_orders_out_of_order_results() {
        let state = Arc::new(PipelineState::new(OrderingPolicy::SequenceGuard));
        let (tx, rx) = mpsc::channel(4);
        let writer = spawn_state_writer(state.clone(), rx);

        tx.send(fake_tick(2, 2)).await.unwrap();
        tx.send(fake_tick(1, 1)).await.unwrap();
        drop(tx);

        let stats = writer.await.unwrap();
        assert_eq!(stats, WriterStats { applied: 1, unchanged: 0, stale: 1 });
        assert_eq!(state.read().index, Some(CorpusIndex(2)));
    }

    #[tokio::test]
    async fn test_run_tick_builds_result() {
        let result = pipeline(FakeCorpus::new())
            .run_tick(TickJob { sequence: 3, index: CorpusIndex(6) })
            .await
            .unwrap();

        assert_eq!(result.sequence, 3);
        assert_eq!(result.index, CorpusIndex(6));
        assert_eq!(result.url, "fake://6.jpg");
        assert_eq!((result.image.width, result.image.height), (2, 2));
        assert!(result.observation.contains("nose"));
    }

    #[tokio::test]
    async fn test_failed_acquisition_keeps_previous_frame() {
        let pipeline = pipeline(FakeCorpus::new().failing(&[7]));
        let state = PipelineState::new(OrderingPolicy::SequenceGuard);

        let six = pipeline.run_tick(TickJob { sequence: 1, index: CorpusIndex(6) }).await.unwrap();
        state.update(six);
        let before = state.read();

        let err = pipeline
            .run_tick(TickJob { sequence: 2, index: CorpusIndex(7) })
            .await
            .unwrap_err();
        assert!(matches!(err, TickError::Acquisition(_)));

        assert_eq!(state.read(), before);
        assert_eq!(state.read().index, Some(CorpusIndex(6)));
    }

    #[tokio::test]
    async fn test_zero_sized_image_drops_tick() {
        let pipeline = pipeline(FakeCorpus::new().empty_images(&[2]));
        let err = pipeline
            .run_tick(TickJob { sequence: 1, index: CorpusIndex(2) })
            .await
            .unwrap_err();
        assert!(matches!(err, TickError::BufferAllocation(_)));
    }

    #[tokio::test]
    async fn test_worker_pool_publishes_and_drains() {
        let state = Arc::new(PipelineState::new(OrderingPolicy::SequenceGuard));
        let pool = WorkerPool::start(pipeline(FakeCorpus::new().failing(&[2])), state.clone(), 1, 4);

        let jobs = pool.sender();
        for (sequence, index) in [(1, 1), (2, 2), (3, 3)] {
            jobs.send(TickJob { sequence, index: CorpusIndex(index) }).await.unwrap();
        }
        drop(jobs);

        let stats = pool.shutdown().await;
        assert_eq!(stats.applied, 2);
        assert_eq!(state.read().index, Some(CorpusIndex(3)));
    }

    #[tokio::test]
    async fn test_worker_pool_overlaps_up_to_worker_count() {
        let corpus = Arc::new(SlowCorpus::new(std::time::Duration::from_millis(20)));
        let state = Arc::new(PipelineState::new(OrderingPolicy::SequenceGuard));
        let pool = WorkerPool::start(pipeline_over(corpus.clone()), state.clone(), 3, 4);

        let jobs = pool.sender();
        for index in 1..=12u32 {
            jobs.send(TickJob { sequence: index as u64, index: CorpusIndex(index) })
                .await
                .unwrap();
        }
        drop(jobs);

        let stats = pool.shutdown().await;
        assert_eq!(corpus.peak(), 3);
        assert_eq!(stats.applied + stats.unchanged + stats.stale, 12);
        assert_eq!(state.read().index, Some(CorpusIndex(12)));
    }
}
