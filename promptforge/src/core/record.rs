//! Source records and derived results.

use serde::{Deserialize, Deserializer, Serialize};

/// One unit of input work.
///
/// `index` is stable for a given input file and filter and identifies the
/// record across process restarts. Records are never mutated once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Stable identifier within the run.
    pub index: usize,
    /// The long-form image-generation prompt.
    pub prompt: String,
    /// Free-form type label (`text`, `json`, ...).
    pub category: String,
    /// Short description already derived for this prompt, when the record
    /// comes from a previous stage's output.
    pub description: Option<String>,
}

impl SourceRecord {
    /// Creates a new source record.
    #[must_use]
    pub fn new(index: usize, prompt: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            category: category.into(),
            description: None,
        }
    }

    /// Attaches a previously derived description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One unit of completed output.
///
/// Serialized as `{simple_description, prompt, prompt_type, original_index,
/// is_augmented}`. Fields this crate does not know about are kept in `extra`
/// and written back untouched, so rewriting the output never drops data a
/// previous tool put there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedResult {
    /// The generated description or paraphrase.
    #[serde(rename = "simple_description")]
    pub derived_text: String,
    /// The source prompt, carried along for the dataset formatter.
    pub prompt: String,
    /// The source category.
    #[serde(rename = "prompt_type", default, deserialize_with = "nullable_string")]
    pub category: String,
    /// Back-reference to [`SourceRecord::index`].
    #[serde(rename = "original_index")]
    pub source_index: usize,
    /// True for paraphrase variants, false for the original description.
    #[serde(rename = "is_augmented", default)]
    pub is_variant: bool,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DerivedResult {
    /// Creates the original derived artifact for a record.
    #[must_use]
    pub fn original(record: &SourceRecord, text: impl Into<String>) -> Self {
        Self::build(record, text.into(), false)
    }

    /// Creates a paraphrase variant for a record.
    #[must_use]
    pub fn variant(record: &SourceRecord, text: impl Into<String>) -> Self {
        Self::build(record, text.into(), true)
    }

    fn build(record: &SourceRecord, derived_text: String, is_variant: bool) -> Self {
        Self {
            derived_text,
            prompt: record.prompt.clone(),
            category: record.category.clone(),
            source_index: record.index,
            is_variant,
            extra: serde_json::Map::new(),
        }
    }

    /// Turns this result back into a source record for the next stage.
    #[must_use]
    pub fn to_source_record(&self) -> SourceRecord {
        SourceRecord::new(self.source_index, self.prompt.clone(), self.category.clone())
            .with_description(self.derived_text.clone())
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Detects the prompt type from its shape.
///
/// Prompts whose trimmed text opens a JSON object or array are `json`,
/// everything else is `text`.
#[must_use]
pub fn detect_prompt_type(prompt: &str) -> &'static str {
    let trimmed = prompt.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        "json"
    } else {
        "text"
    }
}
