//! Run lifecycle events.
//!
//! The dispatcher reports what it does through an [`EventSink`] handed to it
//! at construction. Event types:
//!
//! - `run.started` / `run.finished`
//! - `record.completed` / `record.skipped`
//! - `checkpoint.flushed`

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
