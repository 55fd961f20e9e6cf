// Polling scheduler - walks the corpus index range at a fixed cadence

use crate::core::config::Config;
use crate::models::frame::CorpusIndex;
use crate::models::pipeline::{SchedulerState, TickJob};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Index cursor and the start/advance/stop state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    current: u32,
    max: u32,
    state: SchedulerState,
}

impl Cursor {
    pub fn new(start: u32, max: u32) -> Self {
        Self {
            current: start,
            max,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Last value the cursor held; past `max` once stopped by running off the end
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Begin polling and return the first index to run
    pub fn start(&mut self) -> Option<CorpusIndex> {
        if self.state != SchedulerState::Idle {
            return None;
        }

        if self.current == 0 || self.current > self.max {
            self.state = SchedulerState::Stopped;
            return None;
        }

        self.state = SchedulerState::Running;
        Some(CorpusIndex(self.current))
    }

    /// Step once; `None` means the cursor passed `max` and polling is over
    pub fn advance(&mut self) -> Option<CorpusIndex> {
        if self.state != SchedulerState::Running {
            return None;
        }

        match self.current.checked_add(1) {
            Some(next) if next <= self.max => {
                self.current = next;
                Some(CorpusIndex(next))
            }
            Some(next) => {
                self.current = next;
                self.state = SchedulerState::Stopped;
                None
            }
            None => {
                self.state = SchedulerState::Stopped;
                None
            }
        }
    }

    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
    }
}

/// Triggers one tick per interval until the cursor passes the last index
///
/// The first tick fires immediately. Ticks are handed to the job queue
/// without waiting for earlier ones to finish; a full queue holds the timer
/// back until a worker frees a slot.
pub struct PollingScheduler {
    cursor: Cursor,
    interval: Duration,
    next_sequence: u64,
}

impl PollingScheduler {
    pub fn new(start: u32, max: u32, interval: Duration) -> Self {
        Self {
            cursor: Cursor::new(start, max),
            interval,
            next_sequence: 1,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.start_index, config.max_index, config.poll_interval())
    }

    pub fn state(&self) -> SchedulerState {
        self.cursor.state()
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Drive the cursor to the end, sending each tick to `jobs`
    ///
    /// Returns the number of ticks triggered.
    pub async fn run(&mut self, jobs: &mpsc::Sender<TickJob>) -> u64 {
        if self.interval.is_zero() {
            warn!("Poll interval is zero, scheduler not started");
            self.cursor.stop();
            return 0;
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut triggered = 0u64;
        let mut next = self.cursor.start();
        if let Some(index) = next {
            info!(start = %index, max = self.cursor.max, interval = ?self.interval, "Polling started");
        }

        while let Some(index) = next {
            let job = TickJob {
                sequence: self.next_sequence,
                index,
            };
            self.next_sequence += 1;

            if jobs.send(job).await.is_err() {
                warn!(%index, "Job queue closed, stopping scheduler");
                self.cursor.stop();
                break;
            }
            triggered += 1;

            ticker.tick().await;
            next = self.cursor.advance();
        }

        info!(triggered, cursor = self.cursor.current(), "Polling stopped");
        triggered
    }
}
