//! Run configuration.
//!
//! Loaded from `<config dir>/knowledge_curator/config.toml` with environment
//! variable overrides. A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::knowledge_store::InsertPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub stages: StageTable,

    #[serde(default)]
    pub curation: CurationConfig,

    #[serde(default)]
    pub article: ArticleConfig,

    #[serde(default)]
    pub pipeline: PipelineFlags,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Send the `format: "json"` hint and prefix prompts with a JSON-only
    /// instruction.
    #[serde(default = "default_true")]
    pub json_format: bool,
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/generate".into()
}
fn default_model() -> String {
    "llama3.2:latest".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            json_format: true,
        }
    }
}

/// Sampling settings of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageSettings {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// `[stages.<name>]` tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTable {
    #[serde(default = "default_conversation")]
    pub conversation: StageSettings,
    #[serde(default = "default_question")]
    pub question: StageSettings,
    #[serde(default = "default_outline")]
    pub outline: StageSettings,
    #[serde(default = "default_article")]
    pub article: StageSettings,
    #[serde(default = "default_polish")]
    pub polish: StageSettings,
}

fn default_conversation() -> StageSettings {
    StageSettings::new(0.7, 500)
}
fn default_question() -> StageSettings {
    StageSettings::new(0.7, 500)
}
fn default_outline() -> StageSettings {
    StageSettings::new(0.7, 400)
}
fn default_article() -> StageSettings {
    StageSettings::new(0.7, 700)
}
fn default_polish() -> StageSettings {
    StageSettings::new(0.7, 4000)
}

impl Default for StageTable {
    fn default() -> Self {
        Self {
            conversation: default_conversation(),
            question: default_question(),
            outline: default_outline(),
            article: default_article(),
            polish: default_polish(),
        }
    }
}

impl StageTable {
    fn iter(&self) -> [(&'static str, StageSettings); 5] {
        [
            ("conversation", self.conversation),
            ("question", self.question),
            ("outline", self.outline),
            ("article", self.article),
            ("polish", self.polish),
        ]
    }
}

/// Language of the seed questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "fr")]
    French,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    #[serde(default)]
    pub locale: Locale,

    /// Replaces the locale/persona-derived questions when non-empty.
    #[serde(default)]
    pub seed_questions: Vec<String>,

    #[serde(default)]
    pub personas: Vec<String>,

    /// At most this many personas drive questioning; extras are ignored.
    #[serde(default = "default_max_perspectives")]
    pub max_perspectives: usize,

    #[serde(default)]
    pub insert_policy: InsertPolicy,

    #[serde(default = "default_retrieve_top_k")]
    pub retrieve_top_k: usize,
}

fn default_max_turns() -> usize {
    3
}
fn default_max_perspectives() -> usize {
    3
}
fn default_retrieve_top_k() -> usize {
    3
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            locale: Locale::default(),
            seed_questions: Vec::new(),
            personas: Vec::new(),
            max_perspectives: default_max_perspectives(),
            insert_policy: InsertPolicy::default(),
            retrieve_top_k: default_retrieve_top_k(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleConfig {
    /// Write introduction, body and conclusion with separate calls.
    #[serde(default)]
    pub sectioned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFlags {
    #[serde(default = "default_true")]
    pub do_research: bool,
    #[serde(default = "default_true")]
    pub do_generate_outline: bool,
    #[serde(default = "default_true")]
    pub do_generate_article: bool,
    #[serde(default = "default_true")]
    pub do_polish_article: bool,
}

impl Default for PipelineFlags {
    fn default() -> Self {
        Self {
            do_research: true,
            do_generate_outline: true,
            do_generate_article: true,
            do_polish_article: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// JSONL file receiving every inserted fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_journal: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./results/ollama")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            knowledge_journal: None,
        }
    }
}

impl CuratorConfig {
    /// `<config dir>/knowledge_curator/config.toml`, falling back to `.`.
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("knowledge_curator");
        path.push("config.toml");
        path
    }

    /// Loads the file (defaults when absent), then applies env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(endpoint) = var("CURATOR_ENDPOINT") {
            self.generation.endpoint = endpoint;
        }
        if let Some(model) = var("CURATOR_MODEL") {
            self.generation.model = model;
        }
        if let Some(turns) = var("CURATOR_MAX_TURNS") {
            self.curation.max_turns = turns.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("CURATOR_MAX_TURNS is not a number: {}", turns))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.endpoint.trim().is_empty() {
            return Err(ConfigError::Validation("generation.endpoint is empty".into()));
        }
        if self.generation.model.trim().is_empty() {
            return Err(ConfigError::Validation("generation.model is empty".into()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "generation.timeout_secs must be positive".into(),
            ));
        }

        for (name, stage) in self.stages.iter() {
            if !(0.0..=1.0).contains(&stage.temperature) {
                return Err(ConfigError::Validation(format!(
                    "stages.{}.temperature must be between 0.0 and 1.0",
                    name
                )));
            }
            if stage.max_tokens == 0 {
                return Err(ConfigError::Validation(format!(
                    "stages.{}.max_tokens must be positive",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_original_stage_budgets() {
        let config = CuratorConfig::default();
        assert_eq!(config.stages.outline.max_tokens, 400);
        assert_eq!(config.stages.article.max_tokens, 700);
        assert_eq!(config.stages.polish.max_tokens, 4000);
        assert_eq!(config.curation.max_turns, 3);
        assert_eq!(config.curation.insert_policy, InsertPolicy::Accumulate);
        assert_eq!(config.curation.max_perspectives, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CuratorConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.generation.model, "llama3.2:latest");
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[generation]
model = "mistral"

[stages.outline]
temperature = 0.2
max_tokens = 800

[curation]
max_turns = 5
locale = "fr"
personas = ["historian", "engineer"]
max_perspectives = 1
insert_policy = "overwrite"

[pipeline]
do_polish_article = false
"#,
        )
        .unwrap();

        let config = CuratorConfig::load_from(&path).unwrap();
        assert_eq!(config.generation.model, "mistral");
        assert_eq!(config.generation.endpoint, default_endpoint());
        assert_eq!(config.stages.outline, StageSettings::new(0.2, 800));
        assert_eq!(config.stages.article.max_tokens, 700);
        assert_eq!(config.curation.max_turns, 5);
        assert_eq!(config.curation.locale, Locale::French);
        assert_eq!(config.curation.personas.len(), 2);
        assert_eq!(config.curation.max_perspectives, 1);
        assert_eq!(config.curation.insert_policy, InsertPolicy::Overwrite);
        assert!(!config.pipeline.do_polish_article);
        assert!(config.pipeline.do_research);
    }

    #[test]
    fn out_of_range_temperature_rejected() {
        let mut config = CuratorConfig::default();
        config.stages.article.temperature = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stages.article.temperature"));
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let mut config = CuratorConfig::default();
        config.stages.question.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = CuratorConfig::default();
        config.generation.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("generation.timeout_secs"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[generation\nmodel = ").unwrap();
        assert!(matches!(
            CuratorConfig::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("CURATOR_MODEL", "qwen2"),
            ("CURATOR_MAX_TURNS", "7"),
        ]
        .into_iter()
        .collect();

        let mut config = CuratorConfig::default();
        config
            .apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.generation.model, "qwen2");
        assert_eq!(config.curation.max_turns, 7);
        assert_eq!(config.generation.endpoint, default_endpoint());
    }

    #[test]
    fn non_numeric_max_turns_override_rejected() {
        let mut config = CuratorConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "CURATOR_MAX_TURNS").then(|| "many".to_string())
        });
        assert!(result.is_err());
    }
}
