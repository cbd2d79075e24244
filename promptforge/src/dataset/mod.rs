//! Instruction/output dataset formatting and seeded splitting.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checkpoint::load_results;
use crate::config::PromptTemplates;
use crate::core::{detect_prompt_type, DerivedResult, TrainingSample};
use crate::errors::PromptforgeError;
use crate::tasks::render;

/// Reads the augmented dataset.
///
/// Unlike a ledger, a missing file is an error here.
pub fn load_augmented(path: impl AsRef<Path>) -> Result<Vec<DerivedResult>, PromptforgeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PromptforgeError::input_not_found(path));
    }
    load_results(path).map_err(|err| match err {
        PromptforgeError::CorruptLedger { path, reason } => {
            PromptforgeError::MalformedInput { path, reason }
        }
        other => other,
    })
}

/// Turns one derived result into a training sample.
///
/// The instruction template follows the prompt type, falling back to the
/// detected type when the row has none. The original prompt is the output.
#[must_use]
pub fn format_training_sample(result: &DerivedResult, templates: &PromptTemplates) -> TrainingSample {
    let category = if result.category.trim().is_empty() {
        detect_prompt_type(&result.prompt)
    } else {
        result.category.as_str()
    };
    let template = if category == "json" {
        &templates.instruction_json
    } else {
        &templates.instruction_text
    };
    TrainingSample::new(
        render(template, &[("DESCRIPTION", result.derived_text.as_str())]),
        result.prompt.clone(),
    )
}

/// A train/validation partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit<T> {
    /// Training partition.
    pub train: Vec<T>,
    /// Validation partition.
    pub validation: Vec<T>,
}

/// Returns the training partition size: `floor(len * train_ratio)`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn split_point(len: usize, train_ratio: f64) -> usize {
    let ratio = train_ratio.clamp(0.0, 1.0);
    ((len as f64 * ratio).floor() as usize).min(len)
}

/// Shuffles `items` with a seeded generator and splits them.
///
/// The same input, ratio and seed always give the same partition in the same
/// order.
#[must_use]
pub fn split_dataset<T>(mut items: Vec<T>, train_ratio: f64, seed: u64) -> DatasetSplit<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let validation = items.split_off(split_point(items.len(), train_ratio));
    DatasetSplit {
        train: items,
        validation,
    }
}

/// Draws a seeded sample of at most `count` items, keeping their relative
/// order random.
#[must_use]
pub fn seeded_sample<T: Clone>(items: &[T], count: usize, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    items
        .choose_multiple(&mut rng, count.min(items.len()))
        .cloned()
        .collect()
}
