//! Configuration for every stage.
//!
//! A [`PipelineConfig`] is built once per process and handed to each
//! component at construction. Every field has a default, so a JSON config
//! file only needs the keys it wants to override.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::PromptforgeError;

// -----------------------------------------------------------------------------
// Default prompts
// -----------------------------------------------------------------------------

/// System instructions for describing a prompt through the hosted backend.
pub const HOSTED_DESCRIBE_SYSTEM: &str = "你是一个专业的提示词分析专家。你的任务是分析给定的图像生成提示词，并生成一个简洁的中文描述。

要求：
1. 描述应该简洁，通常 10-30 个中文字
2. 抓住提示词的核心要素：主体、场景、风格
3. 使用自然的中文表达
4. 不需要包含技术参数（如分辨率、相机型号等）

示例：
- 输入：复杂的 JSON 格式提示词，描述霓虹灯下的赛博朋克女孩
- 输出：霓虹街头的赛博朋克女孩，夜景氛围

- 输入：描述一个在咖啡馆看书的年轻女性
- 输出：咖啡馆里看书的文艺女生

- 输入：街拍风格的时尚男士，城市背景
- 输出：都市街拍时尚男士";

/// User message for describing a prompt through the hosted backend.
pub const HOSTED_DESCRIBE_USER: &str = "请为以下图像生成提示词生成一个简洁的中文描述（10-30字）：

提示词类型：{PROMPT_TYPE}

提示词内容：
{PROMPT}

请直接输出中文描述，不要有任何解释或前缀。";

/// System instructions for describing a prompt through the local backend.
pub const LOCAL_DESCRIBE_SYSTEM: &str = "你是一个专业的提示词分析专家。分析图像生成提示词，输出简洁中文描述。

要求：
1. 10-30个中文字
2. 抓住核心：主体、场景、风格
3. 自然中文表达
4. 不含技术参数
5. 只输出描述，无解释";

/// User message for describing a prompt through the local backend.
pub const LOCAL_DESCRIBE_USER: &str = "为以下图像提示词生成简洁中文描述（10-30字）：

{PROMPT}

直接输出描述：";

/// System instructions for paraphrasing a description.
pub const AUGMENT_SYSTEM: &str = "你是一个专业的文本改写专家。你的任务是为给定的图像描述生成不同风格的变体。

要求：
1. 保持核心含义不变
2. 使用不同的表达方式、词汇或句式
3. 变体长度可以略有不同（10-35字）
4. 变体之间要有明显差异

输出格式：每行一个变体，共 2 个变体";

/// User message for paraphrasing a description.
pub const AUGMENT_USER: &str = "原始描述：{DESCRIPTION}

请生成 2 个不同风格的变体描述。每行一个，不要编号或其他标记。";

/// System instructions used when evaluating a fine-tuned model.
pub const EVAL_SYSTEM: &str = "你是 NanoBananaPro 提示词生成专家。根据用户的简单描述，生成高质量的图像生成提示词。";

/// Instruction template for natural-language prompts.
pub const INSTRUCTION_TEXT: &str = "根据以下描述生成 NanoBananaPro 图像提示词。

要求：
1. 输出自然语言格式的详细提示词
2. 包含主体描述、外观、场景、光照、风格等要素
3. 使用专业的摄影/图像生成术语

描述：{DESCRIPTION}";

/// Instruction template for JSON prompts.
pub const INSTRUCTION_JSON: &str = "根据以下描述生成 NanoBananaPro 图像提示词。

要求：
1. 输出 JSON 格式的结构化提示词
2. 包含 subject、environment、lighting、style 等字段
3. 使用专业的摄影/图像生成术语

描述：{DESCRIPTION}";

/// Prompt templates used by the stages.
///
/// Placeholders: `{PROMPT}`, `{PROMPT_TYPE}`, `{DESCRIPTION}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Describe system instructions (hosted backend).
    pub hosted_describe_system: String,
    /// Describe user message (hosted backend).
    pub hosted_describe_user: String,
    /// Describe system instructions (local backend).
    pub local_describe_system: String,
    /// Describe user message (local backend).
    pub local_describe_user: String,
    /// Augment system instructions.
    pub augment_system: String,
    /// Augment user message.
    pub augment_user: String,
    /// Evaluation system instructions.
    pub eval_system: String,
    /// Training instruction for `text` prompts.
    pub instruction_text: String,
    /// Training instruction for `json` prompts.
    pub instruction_json: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            hosted_describe_system: HOSTED_DESCRIBE_SYSTEM.to_string(),
            hosted_describe_user: HOSTED_DESCRIBE_USER.to_string(),
            local_describe_system: LOCAL_DESCRIBE_SYSTEM.to_string(),
            local_describe_user: LOCAL_DESCRIBE_USER.to_string(),
            augment_system: AUGMENT_SYSTEM.to_string(),
            augment_user: AUGMENT_USER.to_string(),
            eval_system: EVAL_SYSTEM.to_string(),
            instruction_text: INSTRUCTION_TEXT.to_string(),
            instruction_json: INSTRUCTION_JSON.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// Retry
// -----------------------------------------------------------------------------

/// Retry configuration for external calls.
///
/// Attempt `n` (0-based) that fails is followed by a pause of
/// `base_delay_ms * backoff_multiplier^n`, i.e. 1s, 2s, 4s with the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Delay after the first failed attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Optional delay cap in milliseconds. Unset means uncapped.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_attempts() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Caps every delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Calculates the pause after the given failed attempt (0-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay = match self.max_delay_ms {
            Some(cap) => delay.min(cap as f64),
            None => delay,
        };
        Duration::try_from_secs_f64(delay / 1000.0).unwrap_or(Duration::MAX)
    }
}

// -----------------------------------------------------------------------------
// Backends
// -----------------------------------------------------------------------------

/// Configuration for the hosted messages API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedConfig {
    /// API base URL.
    #[serde(default = "default_hosted_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_hosted_model")]
    pub model: String,
    /// Value of the `anthropic-version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Output token bound for describe calls.
    #[serde(default = "default_describe_max_tokens")]
    pub describe_max_tokens: u32,
    /// Output token bound for augment calls.
    #[serde(default = "default_augment_max_tokens")]
    pub augment_max_tokens: u32,
    /// Prompts longer than this many characters are truncated.
    #[serde(default = "default_hosted_char_limit")]
    pub prompt_char_limit: usize,
}

fn default_hosted_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_hosted_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_describe_max_tokens() -> u32 {
    100
}

fn default_augment_max_tokens() -> u32 {
    200
}

fn default_hosted_char_limit() -> usize {
    3000
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            base_url: default_hosted_base_url(),
            model: default_hosted_model(),
            api_version: default_api_version(),
            api_key_env: default_api_key_env(),
            describe_max_tokens: default_describe_max_tokens(),
            augment_max_tokens: default_augment_max_tokens(),
            prompt_char_limit: default_hosted_char_limit(),
        }
    }
}

/// Configuration for the local generate API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Service base URL.
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_local_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_local_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,
    /// Prompts longer than this many characters are truncated.
    #[serde(default = "default_local_char_limit")]
    pub prompt_char_limit: usize,
}

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_model() -> String {
    "qwen2.5-coder:latest".to_string()
}

fn default_local_temperature() -> f32 {
    0.7
}

fn default_num_predict() -> u32 {
    100
}

fn default_local_char_limit() -> usize {
    2000
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            model: default_local_model(),
            temperature: default_local_temperature(),
            num_predict: default_num_predict(),
            prompt_char_limit: default_local_char_limit(),
        }
    }
}

// -----------------------------------------------------------------------------
// Stages
// -----------------------------------------------------------------------------

/// Rows above the header in the prompt workbook.
pub const SPREADSHEET_BANNER_ROWS: usize = 2;

/// Source reader options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Rows discarded before the header row. Unset means
    /// [`SPREADSHEET_BANNER_ROWS`] for workbooks and 0 for text tables.
    #[serde(default)]
    pub skip_rows: Option<usize>,
}

impl SourceConfig {
    /// Sets the number of rows above the header.
    #[must_use]
    pub fn with_skip_rows(mut self, rows: usize) -> Self {
        self.skip_rows = Some(rows);
        self
    }

    /// Rows to skip for a workbook (`spreadsheet`) or a text table.
    #[must_use]
    pub fn rows_to_skip(&self, spreadsheet: bool) -> usize {
        match self.skip_rows {
            Some(rows) => rows,
            None if spreadsheet => SPREADSHEET_BANNER_ROWS,
            None => 0,
        }
    }
}

/// Dataset formatter options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Fraction of samples that go to the training split.
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    /// Shuffle seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_train_ratio() -> f64 {
    0.9
}

fn default_seed() -> u64 {
    42
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_ratio: default_train_ratio(),
            seed: default_seed(),
        }
    }
}

/// Evaluation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Number of validation samples to score.
    #[serde(default = "default_eval_samples")]
    pub samples: usize,
    /// Local model name of the fine-tuned model.
    #[serde(default = "default_finetuned_model")]
    pub finetuned_model: String,
    /// Local model name of the base model.
    #[serde(default = "default_base_model")]
    pub base_model: String,
    /// Sampling temperature.
    #[serde(default = "default_eval_temperature")]
    pub temperature: f32,
    /// Maximum tokens to generate.
    #[serde(default = "default_eval_num_predict")]
    pub num_predict: u32,
    /// Sampling seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_eval_samples() -> usize {
    30
}

fn default_finetuned_model() -> String {
    "nano-prompt".to_string()
}

fn default_base_model() -> String {
    "qwen2.5:3b-instruct".to_string()
}

fn default_eval_temperature() -> f32 {
    0.3
}

fn default_eval_num_predict() -> u32 {
    512
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            samples: default_eval_samples(),
            finetuned_model: default_finetuned_model(),
            base_model: default_base_model(),
            temperature: default_eval_temperature(),
            num_predict: default_eval_num_predict(),
            seed: default_seed(),
        }
    }
}

/// Top-level configuration passed into every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum external calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Flush the sink every this many newly processed records.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Timeout of a single external call, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: f64,
    /// Retry behaviour.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Hosted backend.
    #[serde(default)]
    pub hosted: HostedConfig,
    /// Local backend.
    #[serde(default)]
    pub local: LocalConfig,
    /// Prompt templates.
    #[serde(default)]
    pub prompts: PromptTemplates,
    /// Source reader.
    #[serde(default)]
    pub source: SourceConfig,
    /// Dataset formatter.
    #[serde(default)]
    pub dataset: DatasetConfig,
    /// Evaluation.
    #[serde(default)]
    pub eval: EvalConfig,
}

fn default_concurrency() -> usize {
    5
}

fn default_flush_every() -> usize {
    20
}

fn default_call_timeout() -> f64 {
    60.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            flush_every: default_flush_every(),
            call_timeout_secs: default_call_timeout(),
            retry: RetryConfig::default(),
            hosted: HostedConfig::default(),
            local: LocalConfig::default(),
            prompts: PromptTemplates::default(),
            source: SourceConfig::default(),
            dataset: DatasetConfig::default(),
            eval: EvalConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for annotating through the hosted backend (K=5, N=20).
    #[must_use]
    pub fn hosted_annotate() -> Self {
        Self::default()
    }

    /// Preset for annotating through the local backend (K=3, N=20).
    #[must_use]
    pub fn local_annotate() -> Self {
        Self::default().with_concurrency(3)
    }

    /// Preset for the augment stage (K=5, N=50).
    #[must_use]
    pub fn augment() -> Self {
        Self::default().with_flush_every(50)
    }

    /// Preset for the evaluation stage (K=3 against a local model).
    #[must_use]
    pub fn evaluate() -> Self {
        Self::default().with_concurrency(3)
    }

    /// Loads a configuration file on top of `base`.
    ///
    /// Keys missing from the file fall back to the serde defaults, except
    /// for the two deployment knobs (`concurrency`, `flush_every`) which fall
    /// back to the preset passed in.
    pub fn load(path: impl AsRef<Path>, base: Self) -> Result<Self, PromptforgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PromptforgeError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
            PromptforgeError::Config(format!("failed to parse {}: {err}", path.display()))
        })?;
        let mut config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            PromptforgeError::Config(format!("invalid config {}: {err}", path.display()))
        })?;
        if value.get("concurrency").is_none() {
            config.concurrency = base.concurrency;
        }
        if value.get("flush_every").is_none() {
            config.flush_every = base.flush_every;
        }
        config.validate()?;
        Ok(config)
    }

    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the flush cadence.
    #[must_use]
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every;
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout_secs(mut self, seconds: f64) -> Self {
        self.call_timeout_secs = seconds;
        self
    }

    /// Gets the per-call timeout as a Duration.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.call_timeout_secs.max(0.0))
    }

    /// Checks the values that would otherwise stall or corrupt a run.
    pub fn validate(&self) -> Result<(), PromptforgeError> {
        if self.concurrency == 0 {
            return Err(PromptforgeError::Config("concurrency must be at least 1".into()));
        }
        if self.flush_every == 0 {
            return Err(PromptforgeError::Config("flush_every must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(PromptforgeError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(self.retry.backoff_multiplier.is_finite() && self.retry.backoff_multiplier >= 1.0) {
            return Err(PromptforgeError::Config(
                "retry.backoff_multiplier must be a finite value of at least 1.0".into(),
            ));
        }
        if !(self.call_timeout_secs.is_finite() && self.call_timeout_secs > 0.0) {
            return Err(PromptforgeError::Config("call_timeout_secs must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.dataset.train_ratio) {
            return Err(PromptforgeError::Config("dataset.train_ratio must be within 0..=1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, None);
    }

    #[test]
    fn test_delay_for_attempt_doubles() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(32));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(70), Duration::MAX);
        assert_eq!(config.delay_for_attempt(usize::MAX), Duration::MAX);

        let steep = RetryConfig {
            backoff_multiplier: 1e300,
            ..RetryConfig::default()
        };
        assert_eq!(steep.delay_for_attempt(3), Duration::MAX);
        assert_eq!(
            steep.with_max_delay_ms(5000).delay_for_attempt(3),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_validate_rejects_shrinking_backoff() {
        for multiplier in [0.5, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig::new().with_retry(RetryConfig {
                backoff_multiplier: multiplier,
                ..RetryConfig::default()
            });
            assert!(matches!(config.validate(), Err(PromptforgeError::Config(_))));
        }
        let flat = PipelineConfig::new().with_retry(RetryConfig {
            backoff_multiplier: 1.0,
            ..RetryConfig::default()
        });
        assert!(flat.validate().is_ok());
    }

    #[test]
    fn test_skip_rows_defaults_by_format() {
        let config = SourceConfig::default();
        assert_eq!(config.rows_to_skip(true), SPREADSHEET_BANNER_ROWS);
        assert_eq!(config.rows_to_skip(false), 0);
        let explicit = SourceConfig::default().with_skip_rows(1);
        assert_eq!(explicit.rows_to_skip(true), 1);
        assert_eq!(explicit.rows_to_skip(false), 1);
    }

    #[test]
    fn test_delay_cap_applies_when_set() {
        let config = RetryConfig::new().with_max_delay_ms(3000);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(3));
    }

    #[test]
    fn test_presets() {
        assert_eq!(PipelineConfig::hosted_annotate().concurrency, 5);
        assert_eq!(PipelineConfig::hosted_annotate().flush_every, 20);
        assert_eq!(PipelineConfig::local_annotate().concurrency, 3);
        assert_eq!(PipelineConfig::augment().flush_every, 50);
    }

    #[test]
    fn test_empty_json_is_all_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_keeps_preset_knobs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"retry": {{"max_attempts": 5}}, "local": {{"model": "qwen3:8b"}}}}"#).unwrap();

        let config = PipelineConfig::load(file.path(), PipelineConfig::augment()).unwrap();
        assert_eq!(config.flush_every, 50);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.local.model, "qwen3:8b");
        assert_eq!(config.local.num_predict, 100);
    }

    #[test]
    fn test_load_rejects_zero_concurrency() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"concurrency": 0}}"#).unwrap();

        let err = PipelineConfig::load(file.path(), PipelineConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_templates_carry_placeholders() {
        let prompts = PromptTemplates::default();
        assert!(prompts.hosted_describe_user.contains("{PROMPT}"));
        assert!(prompts.hosted_describe_user.contains("{PROMPT_TYPE}"));
        assert!(prompts.augment_user.contains("{DESCRIPTION}"));
        assert!(prompts.instruction_json.contains("subject"));
    }
}
