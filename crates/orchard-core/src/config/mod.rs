//! `config.toml` and the environment
//!
//! Settings live in `<config_dir>/orchard/config.toml` (or under
//! `ORCHARD_CONFIG_DIR`). A missing file means defaults. API keys are never
//! read from or written to the file; they come from the environment only.

use std::env;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "ORCHARD_CONFIG_DIR";

/// Environment variables consulted for the LLM API key, in order
pub const API_KEY_ENV_VARS: [&str; 2] = ["ORCHARD_API_KEY", "OPENROUTER_API_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub database: DatabaseSettings,
}

/// Where and how poems are generated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Always `None` in a valid config; see [`LlmConfig::resolved_api_key`]
    #[serde(skip)]
    pub api_key: Option<String>,
    /// OpenAI-compatible API root, without `/chat/completions`
    pub base_url: String,
    pub default_model: String,
    /// Tried in order when the default model is unavailable or rate limited
    pub fallback_models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            default_model: "meta-llama/llama-3-8b-instruct".to_string(),
            fallback_models: vec!["meta-llama/llama-3.1-8b-instruct".to_string()],
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; `None` means the platform default location
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl LlmConfig {
    /// First non-blank key among [`API_KEY_ENV_VARS`]
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;
        Ok(API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| env::var(var).ok())
            .find(|key| !key.trim().is_empty()))
    }

    /// The resolved key with all but its last four characters hidden
    pub fn redacted_api_key(&self) -> anyhow::Result<Option<String>> {
        Ok(self.resolved_api_key()?.as_deref().map(redact))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            bail!("API keys are read from ORCHARD_API_KEY or OPENROUTER_API_KEY, never from config.toml");
        }
        Ok(())
    }
}

fn redact(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    match chars.len() {
        0..=4 => "***".to_string(),
        n => format!("***{}", chars[n - 4..].iter().collect::<String>()),
    }
}

/// Every key `orchard config` understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    BaseUrl,
    DefaultModel,
    FallbackModels,
    Temperature,
    MaxTokens,
    TimeoutSecs,
    ApiKey,
    DatabasePath,
    MaxConnections,
}

impl Key {
    const ALL: [Key; 9] = [
        Key::BaseUrl,
        Key::DefaultModel,
        Key::FallbackModels,
        Key::Temperature,
        Key::MaxTokens,
        Key::TimeoutSecs,
        Key::ApiKey,
        Key::DatabasePath,
        Key::MaxConnections,
    ];

    fn name(self) -> &'static str {
        match self {
            Key::BaseUrl => "llm.base_url",
            Key::DefaultModel => "llm.default_model",
            Key::FallbackModels => "llm.fallback_models",
            Key::Temperature => "llm.temperature",
            Key::MaxTokens => "llm.max_tokens",
            Key::TimeoutSecs => "llm.timeout_secs",
            Key::ApiKey => "llm.api_key",
            Key::DatabasePath => "database.path",
            Key::MaxConnections => "database.max_connections",
        }
    }
}

impl FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<Self> {
        if name == "api_key" {
            return Ok(Key::ApiKey);
        }
        Key::ALL.into_iter().find(|k| k.name() == name).ok_or_else(|| {
            anyhow!(
                "Unknown configuration key: {}. Use `orchard config list` to see available keys.",
                name
            )
        })
    }
}

fn parse_value<T>(key: Key, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid value '{}' for {}: {}", value, key.name(), e))
}

impl Config {
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        match env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => dirs::config_dir()
                .map(|dir| dir.join("orchard"))
                .ok_or_else(|| anyhow!("Could not determine config directory")),
        }
    }

    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Read `config.toml`, or defaults when there is none
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        match fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text).with_context(|| format!("Invalid {}", path.display())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    /// Current value of `key` as `orchard config get` prints it
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        self.value_of(key.parse()?)
    }

    fn value_of(&self, key: Key) -> anyhow::Result<String> {
        let llm = &self.llm;
        Ok(match key {
            Key::BaseUrl => llm.base_url.clone(),
            Key::DefaultModel => llm.default_model.clone(),
            Key::FallbackModels => llm.fallback_models.join(", "),
            Key::Temperature => llm.temperature.to_string(),
            Key::MaxTokens => llm.max_tokens.to_string(),
            Key::TimeoutSecs => llm.timeout_secs.to_string(),
            Key::ApiKey => llm.redacted_api_key()?.unwrap_or_else(|| {
                "(not set - use ORCHARD_API_KEY or OPENROUTER_API_KEY env var)".to_string()
            }),
            Key::DatabasePath => match &self.database.path {
                Some(path) => path.display().to_string(),
                None => "(default)".to_string(),
            },
            Key::MaxConnections => self.database.max_connections.to_string(),
        })
    }

    /// Change `key`; the caller decides whether to [`save`](Self::save)
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let key: Key = key.parse()?;
        match key {
            Key::BaseUrl => {
                let url = value.trim().trim_end_matches('/');
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("Base URL must start with http:// or https://");
                }
                self.llm.base_url = url.to_string();
            }
            Key::DefaultModel => {
                if value.trim().is_empty() {
                    bail!("Model name cannot be empty");
                }
                self.llm.default_model = value.trim().to_string();
            }
            Key::FallbackModels => {
                self.llm.fallback_models = value
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect();
            }
            Key::Temperature => {
                let temperature: f32 = parse_value(key, value)?;
                if !(0.0..=2.0).contains(&temperature) {
                    bail!("Temperature must be between 0.0 and 2.0");
                }
                self.llm.temperature = temperature;
            }
            Key::MaxTokens => self.llm.max_tokens = parse_value(key, value)?,
            Key::TimeoutSecs => self.llm.timeout_secs = parse_value(key, value)?,
            Key::ApiKey => bail!(
                "API keys cannot be stored in configuration. \
                 Set the ORCHARD_API_KEY or OPENROUTER_API_KEY environment variable instead."
            ),
            Key::DatabasePath => {
                self.database.path = match value.trim() {
                    "" | "default" => None,
                    path => Some(PathBuf::from(path)),
                };
            }
            Key::MaxConnections => {
                let max: u32 = parse_value(key, value)?;
                if max == 0 {
                    bail!("database.max_connections must be at least 1");
                }
                self.database.max_connections = max;
            }
        }
        Ok(())
    }

    /// Every key with its current value, in a fixed order
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        Key::ALL
            .into_iter()
            .map(|key| Ok((key.name().to_string(), self.value_of(key)?)))
            .collect()
    }

    /// Delete `config.toml` so the next load sees defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to remove {}", path.display()))
            }
            _ => Ok(()),
        }
    }
}
