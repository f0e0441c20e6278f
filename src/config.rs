use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    #[serde(default)]
    pub judge: JudgeConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JudgeProviderType {
    /// OpenAI or any OpenAI-compatible chat completions endpoint.
    #[default]
    OpenAI,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub provider: JudgeProviderType,

    /// Base URL of the judge API; the provider's public endpoint when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_judge_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Photos are downscaled so neither side exceeds this before upload.
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Takes precedence over the credential store when set.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("motiva")
        .join("motiva.db")
}

fn default_credentials_path() -> PathBuf {
    Config::config_dir().join("credentials.toml")
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    120
}

fn default_max_image_dimension() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: JudgeProviderType::default(),
            endpoint: None,
            model: default_judge_model(),
            max_tokens: default_max_tokens(),
            max_image_dimension: default_max_image_dimension(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
            system_prompt: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            credentials_path: default_credentials_path(),
            judge: JudgeConfig::default(),
        }
    }
}

impl Config {
    /// Load from `MOTIVA_CONFIG` or the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var_os("MOTIVA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(Self::config_path);
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("motiva")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}
