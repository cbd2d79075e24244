//! Heuristic similarity scores between a generated and a reference prompt.

use regex::Regex;
use std::collections::HashSet;

use crate::errors::PromptforgeError;

/// Common prompt elements counted by [`structure_score`].
pub const PROMPT_ELEMENTS: [&str; 11] = [
    "style",
    "quality",
    "lighting",
    "detailed",
    "realistic",
    "8k",
    "4k",
    "masterpiece",
    "best quality",
    "--ar",
    "--v",
];

/// Extracts keywords and computes keyword overlap.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    word: Regex,
    param: Regex,
}

impl KeywordScorer {
    /// Compiles the keyword patterns.
    pub fn new() -> Result<Self, PromptforgeError> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| PromptforgeError::Config(format!("invalid pattern {pattern}: {err}")))
        };
        Ok(Self {
            word: compile(r"[a-zA-Z]{3,}")?,
            param: compile(r"--\w+\s+[\d:]+")?,
        })
    }

    /// Returns lowercase ASCII words of three or more letters plus
    /// `--flag value` parameters.
    #[must_use]
    pub fn keywords(&self, text: &str) -> HashSet<String> {
        let lower = text.to_lowercase();
        self.word
            .find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .chain(self.param.find_iter(text).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Fraction of the reference keywords that also appear in the generated
    /// text. Zero when the reference has no keywords.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn keyword_overlap(&self, generated: &str, reference: &str) -> f64 {
        let reference = self.keywords(reference);
        if reference.is_empty() {
            return 0.0;
        }
        let generated = self.keywords(generated);
        reference.intersection(&generated).count() as f64 / reference.len() as f64
    }
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn element_hits(text: &str) -> usize {
    let lower = text.to_lowercase();
    PROMPT_ELEMENTS.iter().filter(|e| lower.contains(*e)).count()
}

/// Scores how closely the generated prompt's shape matches the reference.
///
/// 0.3 when both or neither look like JSON, plus 0.3 times the length
/// ratio, plus 0.4 times the share of reference prompt elements matched (a
/// flat 0.2 when the reference has none).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn structure_score(generated: &str, reference: &str) -> f64 {
    let mut score = 0.0;
    if looks_like_json(generated) == looks_like_json(reference) {
        score += 0.3;
    }

    let gen_len = generated.chars().count();
    let ref_len = reference.chars().count();
    let longest = gen_len.max(ref_len);
    if longest > 0 {
        score += 0.3 * gen_len.min(ref_len) as f64 / longest as f64;
    }

    let ref_hits = element_hits(reference);
    if ref_hits > 0 {
        let gen_hits = element_hits(generated);
        score += 0.4 * gen_hits.min(ref_hits) as f64 / ref_hits as f64;
    } else {
        score += 0.2;
    }
    score
}
