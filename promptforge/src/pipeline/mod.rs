//! Bounded-concurrency dispatch with retries.
//!
//! This module provides:
//! - The permit gate bounding in-flight external calls
//! - The retry wrapper with exponential backoff
//! - The dispatcher driving a task over the remaining records
//! - Run progress and summaries

mod dispatcher;
mod gate;
mod retry;
mod summary;

mod integration_tests;

pub use dispatcher::Dispatcher;
pub use gate::ConcurrencyGate;
pub use retry::{RetryDecision, RetryPolicy};
pub use summary::{RunProgress, RunSummary};
