use std::collections::VecDeque;
use std::time::Duration;

/// How a single job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Found { expanded: u32 },
    NoPath { expanded: u32 },
    Failed,
}

/// Rolling window of the most recent job durations.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    /// A window holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.samples.iter().copied().min().unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Counters a worker keeps over its lifetime.
#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub jobs: u64,
    pub found: u64,
    pub no_path: u64,
    pub failed: u64,
    /// Cells expanded across all searches.
    pub expanded: u64,
    pub latency: LatencyWindow,
}

impl WorkerStats {
    pub fn new(latency_window: usize) -> Self {
        Self {
            jobs: 0,
            found: 0,
            no_path: 0,
            failed: 0,
            expanded: 0,
            latency: LatencyWindow::new(latency_window),
        }
    }

    pub fn record(&mut self, outcome: JobOutcome, elapsed: Duration) {
        self.jobs += 1;
        match outcome {
            JobOutcome::Found { expanded } => {
                self.found += 1;
                self.expanded += u64::from(expanded);
            }
            JobOutcome::NoPath { expanded } => {
                self.no_path += 1;
                self.expanded += u64::from(expanded);
            }
            JobOutcome::Failed => self.failed += 1,
        }
        self.latency.record(elapsed);
    }
}
