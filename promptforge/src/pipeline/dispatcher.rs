//! Dispatcher: schedules remaining records through the gate and retry
//! wrapper and feeds completions to the sink.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::gate::ConcurrencyGate;
use super::retry::RetryPolicy;
use super::summary::{RunProgress, RunSummary};
use crate::checkpoint::{ProgressLedger, ResultSink};
use crate::config::PipelineConfig;
use crate::core::{CallOutcome, DerivedResult, SourceRecord};
use crate::errors::PromptforgeError;
use crate::events::{EventSink, NoOpEventSink, RunEvent};
use crate::tasks::AnnotationTask;

/// Runs one task over every record the ledger does not already cover.
///
/// All outstanding calls are multiplexed on the calling task; completions
/// are handled one at a time, so the sink is only ever touched from here.
pub struct Dispatcher {
    task: Arc<dyn AnnotationTask>,
    retry: RetryPolicy,
    gate: ConcurrencyGate,
    flush_every: usize,
    limit: Option<usize>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Creates a dispatcher with `concurrency` permits that flushes every
    /// `flush_every` processed records.
    #[must_use]
    pub fn new(
        task: Arc<dyn AnnotationTask>,
        retry: RetryPolicy,
        concurrency: usize,
        flush_every: usize,
    ) -> Self {
        Self {
            task,
            retry,
            gate: ConcurrencyGate::new(concurrency),
            flush_every: flush_every.max(1),
            limit: None,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates a dispatcher from a pipeline configuration.
    #[must_use]
    pub fn from_config(task: Arc<dyn AnnotationTask>, config: &PipelineConfig) -> Self {
        Self::new(
            task,
            RetryPolicy::new(config.retry.clone(), config.call_timeout()),
            config.concurrency,
            config.flush_every,
        )
    }

    /// Attempts at most `limit` remaining records (sample mode).
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the permit count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.gate.capacity()
    }

    /// Processes every record not in `ledger` and appends results to `sink`.
    ///
    /// Exhausted records are left out and reported in the summary. A fatal
    /// call failure stops scheduling, flushes what was already produced and
    /// returns [`PromptforgeError::ServiceFatal`].
    pub async fn run(
        &self,
        records: &[SourceRecord],
        ledger: &ProgressLedger,
        sink: &mut ResultSink,
    ) -> Result<RunSummary, PromptforgeError> {
        let started = Instant::now();
        let mut summary = RunSummary::start(self.task.name(), records.len(), ledger.len());

        let mut remaining = ledger.remaining(records);
        if let Some(limit) = self.limit {
            remaining.truncate(limit);
        }
        summary.attempted = remaining.len();

        info!(
            run_id = %summary.run_id,
            task = self.task.name(),
            input = records.len(),
            already_completed = ledger.len(),
            remaining = remaining.len(),
            concurrency = self.gate.capacity(),
            "Starting run"
        );
        self.events
            .emit(&RunEvent::RunStarted {
                run_id: summary.run_id,
                task: self.task.name().to_string(),
                input_records: records.len(),
                already_completed: ledger.len(),
                remaining: remaining.len(),
            })
            .await;

        let mut progress = RunProgress::new(remaining.len());
        let mut processed: HashSet<usize> = HashSet::with_capacity(remaining.len());
        let mut fatal: Option<(usize, String)> = None;

        let mut in_flight: FuturesUnordered<_> =
            remaining.into_iter().map(|record| self.attempt(record)).collect();

        while let Some((record, outcome)) = in_flight.next().await {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            match outcome {
                CallOutcome::Completed(results) => {
                    let count = results.len();
                    sink.append(results);
                    summary.completed += 1;
                    summary.new_results += count;
                    progress.record_success(elapsed_ms);
                    self.events.try_emit(&RunEvent::RecordCompleted {
                        index: record.index,
                        results: count,
                    });
                }
                CallOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    warn!(
                        index = record.index,
                        attempts,
                        error = %last_error,
                        "Giving up on record"
                    );
                    summary.skipped_indices.push(record.index);
                    progress.record_failure(elapsed_ms);
                    self.events.try_emit(&RunEvent::RecordSkipped {
                        index: record.index,
                        attempts,
                        error: last_error,
                    });
                }
                CallOutcome::Fatal { reason } => {
                    error!(index = record.index, reason = %reason, "Service rejected request, stopping run");
                    fatal = Some((record.index, reason));
                    break;
                }
            }

            processed.insert(record.index);
            if processed.len() % self.flush_every == 0 {
                self.flush(sink, &progress, &mut summary).await?;
            }
        }
        drop(in_flight);

        self.flush(sink, &progress, &mut summary).await?;
        summary.completed_total = ledger.len() + summary.completed;
        summary.finish(started);

        info!(
            run_id = %summary.run_id,
            completed = summary.completed,
            skipped = summary.skipped_indices.len(),
            completed_total = summary.completed_total,
            input = summary.input_records,
            duration_ms = summary.duration_ms,
            "Run finished: {} of {} records have results",
            summary.completed_total,
            summary.input_records
        );
        self.events
            .emit(&RunEvent::RunFinished(Box::new(summary.clone())))
            .await;

        match fatal {
            Some((index, reason)) => Err(PromptforgeError::ServiceFatal { index, reason }),
            None => Ok(summary),
        }
    }

    async fn attempt<'a>(
        &'a self,
        record: &'a SourceRecord,
    ) -> (&'a SourceRecord, CallOutcome<Vec<DerivedResult>>) {
        let Ok(_permit) = self.gate.acquire().await else {
            return (
                record,
                CallOutcome::Fatal {
                    reason: "concurrency gate closed".to_string(),
                },
            );
        };
        let outcome = self
            .retry
            .execute(record.index, || self.task.run(record))
            .await;
        (record, outcome)
    }

    async fn flush(
        &self,
        sink: &mut ResultSink,
        progress: &RunProgress,
        summary: &mut RunSummary,
    ) -> Result<(), PromptforgeError> {
        sink.flush()?;
        summary.flushes += 1;
        info!(
            completed = progress.completed,
            total = progress.total,
            successes = progress.success_count,
            failures = progress.failure_count,
            percent = progress.percent(),
            results = sink.len(),
            "Progress"
        );
        self.events
            .emit(&RunEvent::CheckpointFlushed {
                path: sink.path().to_path_buf(),
                results: sink.len(),
                processed: progress.completed,
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::events::CollectingEventSink;
    use crate::testing::{numbered_records, ScriptedGenerator};
    use crate::tasks::DescribeTask;
    use std::time::Duration;

    fn dispatcher(generator: Arc<ScriptedGenerator>, concurrency: usize, flush_every: usize) -> Dispatcher {
        let config = PipelineConfig::hosted_annotate();
        Dispatcher::new(
            Arc::new(DescribeTask::new(generator, &config)),
            RetryPolicy::new(
                RetryConfig::new().with_max_attempts(3).with_base_delay_ms(10),
                Duration::from_secs(60),
            ),
            concurrency,
            flush_every,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_cadence_and_events() {
        let dir = tempfile::tempdir().unwrap();
        let records = numbered_records(5);
        let generator = Arc::new(ScriptedGenerator::new());
        let events = Arc::new(CollectingEventSink::new());
        let mut sink = ResultSink::new(dir.path().join("out.json"), Vec::new());

        let summary = dispatcher(generator, 2, 2)
            .with_events(events.clone())
            .run(&records, &ProgressLedger::new(), &mut sink)
            .await
            .unwrap();

        // two cadence flushes (after 2 and 4) plus the final one
        assert_eq!(summary.flushes, 3);
        assert_eq!(sink.flush_count(), 3);
        assert_eq!(summary.completed, 5);
        assert_eq!(events.count("record.completed"), 5);
        assert_eq!(events.count("checkpoint.flushed"), 3);
        assert_eq!(events.count("run.started"), 1);
        assert_eq!(events.count("run.finished"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_caps_attempted_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = numbered_records(10);
        let generator = Arc::new(ScriptedGenerator::new());
        let mut sink = ResultSink::new(dir.path().join("out.json"), Vec::new());

        let summary = dispatcher(generator.clone(), 3, 20)
            .with_limit(Some(4))
            .run(&records, &ProgressLedger::new(), &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.attempted, 4);
        assert_eq!(generator.total_calls(), 4);
        let mut indices: Vec<usize> = sink.results().iter().map(|r| r.source_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_flushes_and_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let records = numbered_records(3);
        let generator = Arc::new(ScriptedGenerator::new().fatal_on(&records[2].prompt));
        let mut sink = ResultSink::new(&path, Vec::new());

        let err = dispatcher(generator, 1, 20)
            .run(&records, &ProgressLedger::new(), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PromptforgeError::ServiceFatal { index: 2, .. }));
        let persisted = crate::checkpoint::load_results(&path).unwrap();
        assert_eq!(persisted.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_remaining_still_flushes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let generator = Arc::new(ScriptedGenerator::new());
        let mut sink = ResultSink::new(&path, Vec::new());

        let summary = dispatcher(generator.clone(), 3, 20)
            .run(&[], &ProgressLedger::new(), &mut sink)
            .await
            .unwrap();

        assert_eq!(summary.flushes, 1);
        assert_eq!(generator.total_calls(), 0);
        assert!(path.exists());
    }
}
