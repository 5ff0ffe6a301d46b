//! Pipeline configuration loaded from TOML.
//!
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{FormalizeError, Result};
use crate::domain::verdict::MAX_SCORE;

/// Which language model answers a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    /// OpenAI-compatible endpoint root; derived from `provider` when unset.
    pub base_url: Option<String>,
    /// Environment variable holding the API key; derived from `provider` when unset.
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Retries for transient failures (0 = no retries, call once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "o4-mini".to_string(),
            base_url: None,
            api_key_env: None,
            temperature: 1.0,
            max_tokens: 16_000,
            timeout_secs: 300,
            max_retries: 2,
            backoff_base_ms: 1_000,
        }
    }
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Default judge model.
    pub fn judge_default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4_000,
            ..Self::new("anthropic", "claude-3-5-sonnet-20241022")
        }
    }

    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "anthropic" => "https://api.anthropic.com/v1",
            "openrouter" => "https://openrouter.ai/api/v1",
            _ => "https://api.openai.com/v1",
        }
        .to_string()
    }

    pub fn resolved_api_key_env(&self) -> String {
        if let Some(var) = &self.api_key_env {
            return var.clone();
        }
        match self.provider.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            "openrouter" => "OPENROUTER_API_KEY",
            _ => "OPENAI_API_KEY",
        }
        .to_string()
    }

    /// `provider/model`, as shown in logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub translate: ModelConfig,
    pub refine: ModelConfig,
    pub judge: ModelConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            translate: ModelConfig::default(),
            refine: ModelConfig::default(),
            judge: ModelConfig::judge_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub max_iterations: u32,
    /// Diagnostics forwarded to the repair prompt.
    pub feedback_messages: usize,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            feedback_messages: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub enabled: bool,
    pub max_iterations: u32,
    /// Inclusive acceptance threshold on the 1-10 scale.
    pub min_score: u8,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 3,
            min_score: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    /// Process only the first `limit` submitted items.
    pub limit: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Program and leading arguments; the rendered file path is appended.
    pub command: Vec<String>,
    /// Lean project root the command runs in.
    pub project_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: vec!["lake".to_string(), "env".to_string(), "lean".to_string()],
            project_dir: PathBuf::from("."),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output/formalized"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub batch: BatchConfig,
    pub refine: RefineConfig,
    pub judge: JudgeConfig,
    pub models: ModelsConfig,
    pub compiler: CompilerConfig,
    pub output: OutputConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            return Err(FormalizeError::InvalidConfig(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.refine.max_iterations == 0 {
            return Err(FormalizeError::InvalidConfig(
                "refine.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.judge.min_score > MAX_SCORE {
            return Err(FormalizeError::InvalidConfig(format!(
                "judge.min_score must be at most {MAX_SCORE}, got {}",
                self.judge.min_score
            )));
        }
        if self.compiler.command.is_empty() {
            return Err(FormalizeError::InvalidConfig(
                "compiler.command must name a program".to_string(),
            ));
        }
        for (role, model) in [
            ("translate", &self.models.translate),
            ("refine", &self.models.refine),
            ("judge", &self.models.judge),
        ] {
            if model.model.trim().is_empty() {
                return Err(FormalizeError::InvalidConfig(format!(
                    "models.{role}.model must not be empty"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.batch.concurrency, 4);
        assert_eq!(config.refine.max_iterations, 10);
        assert_eq!(config.judge.max_iterations, 3);
        assert_eq!(config.judge.min_score, 7);
        assert_eq!(config.models.judge.provider, "anthropic");
        assert_eq!(config.compiler.command[0], "lake");
    }

    #[test]
    fn test_partial_override() {
        let raw = r#"
[batch]
concurrency = 16
limit = 50

[judge]
enabled = false

[models.refine]
provider = "openrouter"
model = "deepseek/deepseek-prover"
"#;
        let config = PipelineConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.batch.concurrency, 16);
        assert_eq!(config.batch.limit, Some(50));
        assert!(!config.judge.enabled);
        assert_eq!(config.judge.min_score, 7);
        assert_eq!(
            config.models.refine.resolved_base_url(),
            "https://openrouter.ai/api/v1"
        );
        assert_eq!(config.models.refine.resolved_api_key_env(), "OPENROUTER_API_KEY");
        assert_eq!(config.models.refine.max_retries, 2);
    }

    #[test]
    fn test_retry_policy_override() {
        let raw = "[models.translate]\nmax_retries = 0\nbackoff_base_ms = 250\n";
        let config = PipelineConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.models.translate.max_retries, 0);
        assert_eq!(config.models.translate.backoff_base_ms, 250);
        assert_eq!(config.models.judge.max_retries, 2);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = PipelineConfig::from_toml_str("[batch]\nconcurrency = 0\n").unwrap_err();
        assert!(matches!(err, FormalizeError::InvalidConfig(_)));
    }

    #[test]
    fn test_score_above_scale_rejected() {
        let err = PipelineConfig::from_toml_str("[judge]\nmin_score = 11\n").unwrap_err();
        assert!(err.to_string().contains("min_score"));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = PipelineConfig::from_toml_str("[batch\n").unwrap_err();
        assert!(matches!(err, FormalizeError::ConfigParse(_)));
    }
}
