//! Run events and the sinks that receive them.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use uuid::Uuid;

use crate::pipeline::RunSummary;

/// Something the dispatcher did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// Scheduling is about to begin.
    RunStarted {
        /// Run identifier, shared with the summary.
        run_id: Uuid,
        /// Task name.
        task: String,
        /// Records read from the input.
        input_records: usize,
        /// Records the ledger already covered.
        already_completed: usize,
        /// Records that will be attempted.
        remaining: usize,
    },
    /// A record produced its results.
    RecordCompleted {
        /// Source index.
        index: usize,
        /// Results appended for it.
        results: usize,
    },
    /// A record ran out of attempts and was left out.
    RecordSkipped {
        /// Source index.
        index: usize,
        /// Attempts made.
        attempts: usize,
        /// Last failure message.
        error: String,
    },
    /// The sink wrote its contents to disk.
    CheckpointFlushed {
        /// Output path.
        path: PathBuf,
        /// Results now on disk.
        results: usize,
        /// Records processed so far this run.
        processed: usize,
    },
    /// The run is over.
    RunFinished(Box<RunSummary>),
}

impl RunEvent {
    /// Returns the dotted event name, e.g. `record.completed`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::RecordCompleted { .. } => "record.completed",
            Self::RecordSkipped { .. } => "record.skipped",
            Self::CheckpointFlushed { .. } => "checkpoint.flushed",
            Self::RunFinished(_) => "run.finished",
        }
    }
}

/// Receives run events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event, possibly waiting on the sink.
    async fn emit(&self, event: &RunEvent);

    /// Delivers an event without waiting. Sinks swallow their own errors.
    fn try_emit(&self, event: &RunEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &RunEvent) {}

    fn try_emit(&self, _event: &RunEvent) {}
}

/// Writes every event to the log as one JSON field.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level`; levels more verbose than `INFO` log at debug.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Info-level sink.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log(&self, event: &RunEvent) {
        let data = serde_json::to_string(event).unwrap_or_default();
        if self.level <= Level::INFO {
            info!(event = event.kind(), data = %data, "Run event");
        } else {
            debug!(event = event.kind(), data = %data, "Run event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.log(event);
    }

    fn try_emit(&self, event: &RunEvent) {
        self.log(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Returns the source indices of `record.skipped` events.
    #[must_use]
    pub fn skipped_indices(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                RunEvent::RecordSkipped { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }

    fn try_emit(&self, event: &RunEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_and_json_tag() {
        let event = RunEvent::RecordSkipped {
            index: 7,
            attempts: 3,
            error: "timed out".to_string(),
        };
        assert_eq!(event.kind(), "record.skipped");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "record_skipped");
        assert_eq!(value["index"], 7);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        sink.emit(&RunEvent::RecordCompleted { index: 0, results: 1 }).await;
        sink.try_emit(&RunEvent::RecordSkipped {
            index: 4,
            attempts: 3,
            error: "boom".to_string(),
        });
        sink.try_emit(&RunEvent::RecordCompleted { index: 1, results: 3 });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count("record.completed"), 2);
        assert_eq!(sink.skipped_indices(), vec![4]);
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        let event = RunEvent::CheckpointFlushed {
            path: PathBuf::from("out.json"),
            results: 2,
            processed: 2,
        };
        NoOpEventSink.emit(&event).await;
        LoggingEventSink::info().emit(&event).await;
        LoggingEventSink::default().try_emit(&event);
    }
}
