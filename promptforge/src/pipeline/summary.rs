//! Run progress and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Progress of the current run, logged after every flush.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    /// Records processed this run (completed or skipped).
    pub completed: usize,
    /// Records scheduled this run.
    pub total: usize,
    /// Records that produced results.
    pub success_count: usize,
    /// Records skipped after exhausting their attempts.
    pub failure_count: usize,
    /// Elapsed time in milliseconds.
    pub elapsed_ms: f64,
}

impl RunProgress {
    /// Creates a new progress tracker.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Returns the completion percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Updates progress with a completed record.
    pub fn record_success(&mut self, elapsed_ms: f64) {
        self.completed += 1;
        self.success_count += 1;
        self.elapsed_ms = elapsed_ms;
    }

    /// Updates progress with a skipped record.
    pub fn record_failure(&mut self, elapsed_ms: f64) {
        self.completed += 1;
        self.failure_count += 1;
        self.elapsed_ms = elapsed_ms;
    }
}

/// Summary of one dispatcher run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: Uuid,
    /// Task name.
    pub task: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Records read from the source.
    pub input_records: usize,
    /// Records the ledger already held at startup.
    pub already_completed: usize,
    /// Records scheduled this run.
    pub attempted: usize,
    /// Records that produced results this run.
    pub completed: usize,
    /// Records left without results after exhausting their attempts.
    pub skipped: usize,
    /// Indices of the skipped records, ascending.
    pub skipped_indices: Vec<usize>,
    /// Results appended this run.
    pub new_results: usize,
    /// Distinct source indices with results after the run.
    pub completed_total: usize,
    /// Flushes performed this run.
    pub flushes: usize,
    /// Wall time in milliseconds.
    pub duration_ms: f64,
}

impl RunSummary {
    pub(crate) fn start(task: &str, input_records: usize, already_completed: usize) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            task: task.to_string(),
            started_at: now,
            finished_at: now,
            input_records,
            already_completed,
            attempted: 0,
            completed: 0,
            skipped: 0,
            skipped_indices: Vec::new(),
            new_results: 0,
            completed_total: already_completed,
            flushes: 0,
            duration_ms: 0.0,
        }
    }

    pub(crate) fn finish(&mut self, started: Instant) {
        self.skipped_indices.sort_unstable();
        self.skipped = self.skipped_indices.len();
        self.finished_at = Utc::now();
        self.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    }

    /// Returns true if every input record now has results.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed_total >= self.input_records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_progress() {
        let mut progress = RunProgress::new(4);
        assert_eq!(progress.percent(), 0.0);

        progress.record_success(10.0);
        progress.record_failure(20.0);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.success_count, 1);
        assert_eq!(progress.failure_count, 1);
        assert_eq!(progress.percent(), 50.0);
    }

    #[test]
    fn test_run_progress_empty() {
        assert_eq!(RunProgress::new(0).percent(), 0.0);
    }

    #[test]
    fn test_summary_finish_sorts_skipped() {
        let mut summary = RunSummary::start("describe", 10, 3);
        summary.skipped_indices = vec![8, 4];
        summary.finish(Instant::now());

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.skipped_indices, vec![4, 8]);
        assert!(!summary.is_complete());
        assert!(summary.finished_at >= summary.started_at);
    }
}
