//! Test fixtures.

use std::path::{Path, PathBuf};

use crate::core::SourceRecord;

/// Returns the prompt text used for record `index` by [`numbered_records`].
///
/// Keys are zero-padded so no key is a substring of another.
#[must_use]
pub fn record_key(index: usize) -> String {
    format!("prompt-{index:04}")
}

/// Builds `count` text records whose prompts are [`record_key`] values.
#[must_use]
pub fn numbered_records(count: usize) -> Vec<SourceRecord> {
    (0..count)
        .map(|i| SourceRecord::new(i, record_key(i), "text"))
        .collect()
}

/// Writes a CSV source file with `prompt,prompt_type` columns.
pub fn write_source_csv(
    dir: impl AsRef<Path>,
    name: &str,
    rows: &[(&str, &str)],
) -> std::io::Result<PathBuf> {
    let path = dir.as_ref().join(name);
    let mut writer = csv::Writer::from_path(&path)?;
    writer.write_record(["prompt", "prompt_type"])?;
    for (prompt, category) in rows {
        writer.write_record([*prompt, *category])?;
    }
    writer.flush()?;
    Ok(path)
}
