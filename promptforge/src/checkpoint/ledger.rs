//! Progress ledger rebuilt from the output file.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::core::{DerivedResult, SourceRecord};
use crate::errors::PromptforgeError;

/// Reads a possibly absent output file as a sequence of derived results.
///
/// An absent file, or one holding only whitespace, yields an empty sequence.
/// Anything else that is not a JSON array of result rows is a
/// [`PromptforgeError::CorruptLedger`].
pub fn load_results(path: impl AsRef<Path>) -> Result<Vec<DerivedResult>, PromptforgeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .map_err(|err| PromptforgeError::corrupt_ledger(path, err.to_string()))
}

/// The set of source indices that already have a durably written result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressLedger {
    completed: BTreeSet<usize>,
}

impl ProgressLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the ledger from results already loaded from disk.
    #[must_use]
    pub fn from_results(results: &[DerivedResult]) -> Self {
        Self {
            completed: results.iter().map(|r| r.source_index).collect(),
        }
    }

    /// Reads the output file and builds the ledger from it.
    pub fn rebuild(path: impl AsRef<Path>) -> Result<Self, PromptforgeError> {
        let path = path.as_ref();
        let results = load_results(path)?;
        let ledger = Self::from_results(&results);
        info!(
            path = %path.display(),
            results = results.len(),
            completed = ledger.len(),
            "Rebuilt progress ledger"
        );
        Ok(ledger)
    }

    /// Returns true if the index already has a result.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Returns the number of completed indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// Returns true if nothing has been completed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Iterates completed indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.completed.iter().copied()
    }

    /// Returns the records still to do, in source order.
    #[must_use]
    pub fn remaining<'a>(&self, records: &'a [SourceRecord]) -> Vec<&'a SourceRecord> {
        records.iter().filter(|r| !self.contains(r.index)).collect()
    }
}
