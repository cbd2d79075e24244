//! Per-record annotation tasks.
//!
//! A task turns one [`SourceRecord`] into the derived results for that
//! record by making exactly one external call. Retries, concurrency and
//! persistence are the dispatcher's business; a task only builds the request
//! and parses the response.

mod augment;
mod describe;
pub mod parse;

pub use augment::AugmentTask;
pub use describe::{DescribeTask, ResponseStyle};

use async_trait::async_trait;

use crate::core::{CallFailure, DerivedResult, SourceRecord};

/// One attempt at deriving results for a record.
#[async_trait]
pub trait AnnotationTask: Send + Sync {
    /// Returns the task name, used in logs and events.
    fn name(&self) -> &str;

    /// Makes one external call for `record` and returns its results.
    ///
    /// A returned vector is never empty.
    async fn run(&self, record: &SourceRecord) -> Result<Vec<DerivedResult>, CallFailure>;
}

/// Fills `{KEY}` placeholders in a template.
pub(crate) fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}
