//! Instruction/output training samples.

use serde::{Deserialize, Serialize};

/// A single instruction-tuning sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// The instruction shown to the model.
    pub instruction: String,
    /// Optional extra input, always empty for this dataset.
    #[serde(default)]
    pub input: String,
    /// The expected completion.
    pub output: String,
}

impl TrainingSample {
    /// Creates a sample with an empty input field.
    #[must_use]
    pub fn new(instruction: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            input: String::new(),
            output: output.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_empty_input() {
        let sample = TrainingSample::new("根据以下描述生成", "a cat");
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"instruction":"根据以下描述生成","input":"","output":"a cat"}"#);
    }
}
