//! Result sink with atomic whole-file flushes.

use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::DerivedResult;
use crate::errors::PromptforgeError;

/// Serializes `value` as pretty JSON and swaps it into place.
///
/// The data goes to a sibling temp file first and is renamed over `path`, so
/// a reader sees either the old file or the new one, never a torn write.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), PromptforgeError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = temp_sibling(path);
    let file = File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    let file = writer
        .into_inner()
        .map_err(|err| PromptforgeError::Io(err.into_error()))?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("output"), OsString::from);
    name.push(".tmp");
    path.with_file_name(name)
}

/// In-memory result sequence backed by the output file.
///
/// The sequence is the previously persisted results, verbatim and in order,
/// followed by this run's results in completion order. Nothing is ever
/// removed.
#[derive(Debug)]
pub struct ResultSink {
    path: PathBuf,
    results: Vec<DerivedResult>,
    previous: usize,
    flushes: usize,
}

impl ResultSink {
    /// Creates a sink seeded with the results already on disk.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, previous: Vec<DerivedResult>) -> Self {
        let count = previous.len();
        Self {
            path: path.into(),
            results: previous,
            previous: count,
            flushes: 0,
        }
    }

    /// Returns the output path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the results of one completed record.
    pub fn append(&mut self, results: impl IntoIterator<Item = DerivedResult>) {
        self.results.extend(results);
    }

    /// Writes the whole sequence to the output path.
    pub fn flush(&mut self) -> Result<(), PromptforgeError> {
        write_json_atomic(&self.path, &self.results)?;
        self.flushes += 1;
        debug!(
            path = %self.path.display(),
            results = self.results.len(),
            flushes = self.flushes,
            "Flushed results"
        );
        Ok(())
    }

    /// Returns every result, previous ones first.
    #[must_use]
    pub fn results(&self) -> &[DerivedResult] {
        &self.results
    }

    /// Returns the total number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns true if the sink holds no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns the number of results produced by this run.
    #[must_use]
    pub fn new_results(&self) -> usize {
        self.results.len() - self.previous
    }

    /// Returns how many times the sink has been flushed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}
