//! Progress accounting shared by every worker.

use std::time::Duration;

/// Default number of processed documents between progress lines.
pub const DEFAULT_REPORT_EVERY: u64 = 10;

/// Default number of processed documents between index refreshes.
pub const DEFAULT_REFRESH_EVERY: u64 = 1000;

/// How often progress is reported and the index refreshed.
///
/// An interval of zero disables the corresponding action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressIntervals {
    pub report_every: u64,
    pub refresh_every: u64,
}

impl Default for ProgressIntervals {
    fn default() -> Self {
        Self {
            report_every: DEFAULT_REPORT_EVERY,
            refresh_every: DEFAULT_REFRESH_EVERY,
        }
    }
}

/// Job-wide counters. Only mutated while holding the cursor lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub processed: u64,
    pub total: u64,
    pub exhausted: bool,
}

/// Outcome of recording a processed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTick {
    pub processed: u64,
    pub total: u64,
    /// A reporting interval was crossed.
    pub report: bool,
    /// A refresh interval was crossed.
    pub refresh: bool,
    /// Time since the first batch was claimed.
    pub elapsed: Duration,
}

impl ProgressTick {
    pub fn percent(&self) -> f64 {
        percent(self.processed, self.total)
    }
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Add `count` processed documents and report which intervals were crossed.
    pub fn advance(
        &mut self,
        count: u64,
        intervals: &ProgressIntervals,
        elapsed: Duration,
    ) -> ProgressTick {
        let before = self.processed;
        self.processed += count;

        ProgressTick {
            processed: self.processed,
            total: self.total,
            report: crossed(before, self.processed, intervals.report_every),
            refresh: crossed(before, self.processed, intervals.refresh_every),
            elapsed,
        }
    }

    pub fn percent(&self) -> f64 {
        percent(self.processed, self.total)
    }
}

fn crossed(before: u64, after: u64, every: u64) -> bool {
    every > 0 && before / every != after / every
}

fn percent(processed: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        processed as f64 * 100.0 / total as f64
    }
}
