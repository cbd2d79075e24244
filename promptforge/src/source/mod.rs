//! Source reader.
//!
//! Loads the prompt table (a workbook or a text table) into an ordered
//! sequence of [`SourceRecord`]s.
//! Records with an empty prompt are dropped first; the surviving records
//! are numbered 0.. in file order, so indices are stable for a given file.

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::checkpoint::load_results;
use crate::config::SourceConfig;
use crate::core::{detect_prompt_type, SourceRecord};
use crate::errors::PromptforgeError;

/// Column holding the prompt text.
pub const PROMPT_FIELD: &str = "prompt";
/// Column holding the category label.
pub const CATEGORY_FIELD: &str = "prompt_type";

/// Input formats understood by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Excel or OpenDocument workbook; the first sheet is read.
    Xlsx,
    /// Comma separated values with a header row.
    Csv,
    /// Tab separated values with a header row.
    Tsv,
    /// A JSON array of objects.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl SourceFormat {
    /// Picks the format from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            "tsv" => Some(Self::Tsv),
            "json" => Some(Self::Json),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// A raw row before filtering.
#[derive(Debug, Default)]
struct RawRow {
    prompt: Option<String>,
    category: Option<String>,
}

/// Reads source records from disk.
#[derive(Debug, Clone)]
pub struct SourceReader {
    path: PathBuf,
    config: SourceConfig,
}

impl SourceReader {
    /// Creates a reader for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, config: SourceConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    /// Returns the source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the prompt table.
    pub fn read(&self) -> Result<Vec<SourceRecord>, PromptforgeError> {
        if !self.path.exists() {
            return Err(PromptforgeError::input_not_found(&self.path));
        }
        let format = SourceFormat::from_path(&self.path).ok_or_else(|| {
            PromptforgeError::malformed_input(
                &self.path,
                "unsupported extension (expected .xlsx, .csv, .tsv, .json or .jsonl)",
            )
        })?;

        let rows = match format {
            SourceFormat::Xlsx => self.parse_workbook()?,
            SourceFormat::Csv => self.parse_delimited(&self.read_text()?, b',')?,
            SourceFormat::Tsv => self.parse_delimited(&self.read_text()?, b'\t')?,
            SourceFormat::Json => self.parse_json_array(&self.read_text()?)?,
            SourceFormat::JsonLines => self.parse_json_lines(&self.read_text()?)?,
        };
        let loaded = rows.len();
        let records = index_rows(rows);

        info!(
            path = %self.path.display(),
            loaded,
            valid = records.len(),
            "Loaded source prompts"
        );
        Ok(records)
    }

    /// Loads the output of a previous annotate run as source records.
    ///
    /// Each record keeps the `original_index` of the row it came from, so
    /// the next stage's ledger lines up with the first stage's numbering.
    pub fn read_annotated(path: impl AsRef<Path>) -> Result<Vec<SourceRecord>, PromptforgeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PromptforgeError::input_not_found(path));
        }
        let results = load_results(path).map_err(|err| match err {
            PromptforgeError::CorruptLedger { path, reason } => {
                PromptforgeError::MalformedInput { path, reason }
            }
            other => other,
        })?;

        let records: Vec<SourceRecord> = results
            .iter()
            .filter(|result| !result.is_variant && !result.derived_text.trim().is_empty())
            .map(crate::core::DerivedResult::to_source_record)
            .collect();

        info!(
            path = %path.display(),
            loaded = results.len(),
            valid = records.len(),
            "Loaded annotated records"
        );
        Ok(records)
    }

    fn read_text(&self) -> Result<String, PromptforgeError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    fn locate_columns<'h>(
        &self,
        headers: impl IntoIterator<Item = &'h str>,
    ) -> Result<(usize, usize), PromptforgeError> {
        let headers: Vec<&str> = headers.into_iter().map(str::trim).collect();
        let column = |name: &str| {
            headers.iter().position(|h| *h == name).ok_or_else(|| {
                PromptforgeError::malformed_input(&self.path, format!("missing column '{name}'"))
            })
        };
        Ok((column(PROMPT_FIELD)?, column(CATEGORY_FIELD)?))
    }

    fn parse_workbook(&self) -> Result<Vec<RawRow>, PromptforgeError> {
        let malformed = |reason: String| PromptforgeError::malformed_input(&self.path, reason);
        let mut workbook = open_workbook_auto(&self.path).map_err(|err| malformed(err.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| malformed("workbook has no sheets".to_string()))?
            .map_err(|err| malformed(err.to_string()))?;

        // The used range begins at the first non-empty row, so empty banner
        // rows are already gone from it.
        let first_row = range
            .start()
            .map_or(0, |(row, _)| usize::try_from(row).unwrap_or(usize::MAX));
        let skip = self.config.rows_to_skip(true).saturating_sub(first_row);
        let mut rows = range.rows().skip(skip);

        let headers: Vec<String> = rows
            .next()
            .ok_or_else(|| malformed("no header row".to_string()))?
            .iter()
            .map(ToString::to_string)
            .collect();
        let (prompt_col, category_col) = self.locate_columns(headers.iter().map(String::as_str))?;

        let rows: Vec<RawRow> = rows
            .map(|row| RawRow {
                prompt: cell_text(row.get(prompt_col)),
                category: cell_text(row.get(category_col)),
            })
            .collect();
        debug!(path = %self.path.display(), rows = rows.len(), "Read workbook sheet");
        Ok(rows)
    }

    fn parse_delimited(&self, raw: &str, delimiter: u8) -> Result<Vec<RawRow>, PromptforgeError> {
        let body: String = raw
            .split_inclusive('\n')
            .skip(self.config.rows_to_skip(false))
            .collect();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|err| PromptforgeError::malformed_input(&self.path, err.to_string()))?
            .clone();
        let (prompt_col, category_col) = self.locate_columns(headers.iter())?;

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|err| {
                PromptforgeError::malformed_input(&self.path, format!("row {}: {err}", line + 1))
            })?;
            rows.push(RawRow {
                prompt: record.get(prompt_col).map(str::to_string),
                category: record.get(category_col).map(str::to_string),
            });
        }
        Ok(rows)
    }

    fn parse_json_array(&self, raw: &str) -> Result<Vec<RawRow>, PromptforgeError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| PromptforgeError::malformed_input(&self.path, err.to_string()))?;
        let Value::Array(items) = value else {
            return Err(PromptforgeError::malformed_input(
                &self.path,
                "expected a JSON array of objects",
            ));
        };
        self.rows_from_values(&items)
    }

    fn parse_json_lines(&self, raw: &str) -> Result<Vec<RawRow>, PromptforgeError> {
        let mut items = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|err| {
                PromptforgeError::malformed_input(&self.path, format!("line {}: {err}", line_no + 1))
            })?;
            items.push(value);
        }
        self.rows_from_values(&items)
    }

    fn rows_from_values(&self, items: &[Value]) -> Result<Vec<RawRow>, PromptforgeError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        for field in [PROMPT_FIELD, CATEGORY_FIELD] {
            if !items.iter().any(|item| item.get(field).is_some()) {
                return Err(PromptforgeError::malformed_input(
                    &self.path,
                    format!("no record carries '{field}'"),
                ));
            }
        }
        Ok(items
            .iter()
            .map(|item| RawRow {
                prompt: item.get(PROMPT_FIELD).and_then(value_as_text),
                category: item.get(CATEGORY_FIELD).and_then(value_as_text),
            })
            .collect())
    }
}

fn cell_text(cell: Option<&Data>) -> Option<String> {
    match cell? {
        Data::Empty => None,
        other => Some(other.to_string()),
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn index_rows(rows: Vec<RawRow>) -> Vec<SourceRecord> {
    rows.into_iter()
        .filter_map(|row| {
            let prompt = row.prompt?;
            if prompt.trim().is_empty() {
                return None;
            }
            let category = match row.category {
                Some(c) if !c.trim().is_empty() => c.trim().to_string(),
                _ => {
                    debug!("Missing prompt_type, detecting from prompt shape");
                    detect_prompt_type(&prompt).to_string()
                }
            };
            Some((prompt, category))
        })
        .enumerate()
        .map(|(index, (prompt, category))| SourceRecord::new(index, prompt, category))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_input_not_found() {
        let reader = SourceReader::new("/definitely/not/here.csv", SourceConfig::default());
        let err = reader.read().unwrap_err();
        assert!(matches!(err, PromptforgeError::InputNotFound { .. }));
    }

    #[test]
    fn test_csv_drops_empty_prompts_and_reindexes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prompts.csv",
            "prompt,prompt_type\nA,text\n,json\n   ,text\nB,json\n",
        );

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(
            records,
            vec![SourceRecord::new(0, "A", "text"), SourceRecord::new(1, "B", "json")]
        );
    }

    #[test]
    fn test_csv_skip_rows_before_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prompts.csv",
            "Nano Banana Pro prompts\nexported 2025\nid,prompt,prompt_type\n1,\"a, quoted prompt\",text\n",
        );

        let reader = SourceReader::new(path, SourceConfig::default().with_skip_rows(2));
        let records = reader.read().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].prompt, "a, quoted prompt");
    }

    /// Writes `(row, column, text)` cells into the first sheet of a new workbook.
    fn write_workbook(dir: &tempfile::TempDir, name: &str, cells: &[(u32, u16, &str)]) -> PathBuf {
        let path = dir.path().join(name);
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        for &(row, col, text) in cells {
            sheet.write_string(row, col, text).unwrap();
        }
        workbook.save(&path).unwrap();
        path
    }

    #[test]
    fn test_workbook_skips_banner_rows_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            &dir,
            "NanoBananaProPrompts.xlsx",
            &[
                (0, 0, "Nano Banana Pro prompt collection"),
                (1, 0, "exported 2025-11"),
                (2, 0, "id"),
                (2, 1, "prompt"),
                (2, 2, "prompt_type"),
                (3, 0, "1"),
                (3, 1, "a neon street at night"),
                (3, 2, "text"),
                (4, 0, "2"),
                (4, 2, "text"),
                (5, 0, "3"),
                (5, 1, "{\"subject\":\"cat\"}"),
            ],
        );

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(
            records,
            vec![
                SourceRecord::new(0, "a neon street at night", "text"),
                SourceRecord::new(1, "{\"subject\":\"cat\"}", "json"),
            ]
        );
    }

    #[test]
    fn test_workbook_with_empty_banner_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            &dir,
            "prompts.xlsx",
            &[(2, 0, "prompt"), (2, 1, "prompt_type"), (3, 0, "A"), (3, 1, "text")],
        );

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(records, vec![SourceRecord::new(0, "A", "text")]);
    }

    #[test]
    fn test_workbook_header_on_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            &dir,
            "prompts.xlsx",
            &[(0, 0, "prompt_type"), (0, 1, "prompt"), (1, 0, "json"), (1, 1, "B")],
        );

        let config = SourceConfig::default().with_skip_rows(0);
        let records = SourceReader::new(path, config).read().unwrap();
        assert_eq!(records, vec![SourceRecord::new(0, "B", "json")]);
    }

    #[test]
    fn test_workbook_missing_column_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workbook(
            &dir,
            "prompts.xlsx",
            &[(2, 0, "text"), (2, 1, "kind"), (3, 0, "A"), (3, 1, "text")],
        );

        let err = SourceReader::new(path, SourceConfig::default()).read().unwrap_err();
        assert!(err.to_string().contains("missing column 'prompt'"));
    }

    #[test]
    fn test_unreadable_workbook_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prompts.xlsx", "not a zip archive");

        let err = SourceReader::new(path, SourceConfig::default()).read().unwrap_err();
        assert!(matches!(err, PromptforgeError::MalformedInput { .. }));
    }

    #[test]
    fn test_csv_missing_column_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prompts.csv", "text,kind\nA,text\n");

        let err = SourceReader::new(path, SourceConfig::default()).read().unwrap_err();
        assert!(matches!(err, PromptforgeError::MalformedInput { .. }));
    }

    #[test]
    fn test_tsv_and_detected_category() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prompts.tsv", "prompt\tprompt_type\n{\"subject\":\"cat\"}\t\n");

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(records[0].category, "json");
    }

    #[test]
    fn test_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prompts.json",
            r#"[{"prompt":"A","prompt_type":"text"},{"prompt":null,"prompt_type":"text"},{"prompt":"B","prompt_type":"json"}]"#,
        );

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], SourceRecord::new(1, "B", "json"));
    }

    #[test]
    fn test_json_without_required_field_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "prompts.json", r#"[{"text":"A"},{"text":"B"}]"#);

        let err = SourceReader::new(path, SourceConfig::default()).read().unwrap_err();
        assert!(err.to_string().contains("no record carries 'prompt'"));
    }

    #[test]
    fn test_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "prompts.jsonl",
            "{\"prompt\":\"A\",\"prompt_type\":\"text\"}\n\n{\"prompt\":\"B\"}\n",
        );

        let records = SourceReader::new(path, SourceConfig::default()).read().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].category, "text");
    }

    #[test]
    fn test_read_annotated_keeps_original_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "raw.json",
            r#"[{"simple_description":"猫","prompt":"a cat","prompt_type":"text","original_index":4},
                {"simple_description":"狗","prompt":"a dog","prompt_type":"text","original_index":9}]"#,
        );

        let records = SourceReader::read_annotated(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 4);
        assert_eq!(records[1].index, 9);
        assert_eq!(records[1].description.as_deref(), Some("狗"));
    }

    #[test]
    fn test_read_annotated_bad_json_is_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "raw.json", "[{");

        let err = SourceReader::read_annotated(&path).unwrap_err();
        assert!(matches!(err, PromptforgeError::MalformedInput { .. }));
    }
}
