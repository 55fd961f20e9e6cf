// Data structures shared by the scheduler, the tick workers, and the state writer

use crate::models::frame::{AcquisitionError, BufferAllocationError, CorpusIndex, RawImage};
use crate::models::pose::PoseObservation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// One scheduled run of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickJob {
    pub sequence: u64,
    pub index: CorpusIndex,
}

/// A tick that made it through acquisition and conversion
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub sequence: u64,      // Assigned when the tick was triggered
    pub index: CorpusIndex,
    pub url: String,
    pub image: Arc<RawImage>,
    pub observation: PoseObservation,
    pub completed_at: i64,  // Milliseconds since the Unix epoch
}

/// What the display layer reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSnapshot {
    pub current_image: Option<Arc<RawImage>>,
    pub current_observation: PoseObservation,
    pub index: Option<CorpusIndex>,
    pub url: Option<String>,
    pub sequence: Option<u64>,
    pub completed_at: Option<i64>,
}

impl PipelineSnapshot {
    pub fn from_tick(tick: TickResult) -> Self {
        Self {
            current_image: Some(tick.image),
            current_observation: tick.observation,
            index: Some(tick.index),
            url: Some(tick.url),
            sequence: Some(tick.sequence),
            completed_at: Some(tick.completed_at),
        }
    }
}

/// Result of offering a tick to the published state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Same content as already published
    Unchanged,
    /// Older than the last applied tick
    Stale,
}

/// Counts kept by the state writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub applied: u64,
    pub unchanged: u64,
    pub stale: u64,
}

impl WriterStats {
    pub fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Applied => self.applied += 1,
            UpdateOutcome::Unchanged => self.unchanged += 1,
            UpdateOutcome::Stale => self.stale += 1,
        }
    }
}

/// Outcome of a full polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub triggered: u64,
    pub final_cursor: u32,
    pub writer: WriterStats,
}

/// Why a tick was dropped without touching the published state
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    BufferAllocation(#[from] BufferAllocationError),
}

/// Why a polling run could not start
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Lifecycle of the polling scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// How the state writer treats results that complete out of order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Drop results older than the last applied one
    #[default]
    SequenceGuard,
    /// Apply every result as it arrives
    LastWriteWins,
}

impl OrderingPolicy {
    pub fn to_config_string(&self) -> &'static str {
        match self {
            OrderingPolicy::SequenceGuard => "sequence_guard",
            OrderingPolicy::LastWriteWins => "last_write_wins",
        }
    }
}

impl fmt::Display for OrderingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_config_string())
    }
}

impl FromStr for OrderingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequence_guard" => Ok(OrderingPolicy::SequenceGuard),
            "last_write_wins" => Ok(OrderingPolicy::LastWriteWins),
            other => Err(format!(
                "Unknown ordering policy: {}. Must be one of: sequence_guard, last_write_wins",
                other
            )),
        }
    }
}
