use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::TokenCounterKind;

const CONFIG_FILE_PATH: &str = "dbchat.toml";

pub const DEFAULT_GREETING: &str = "Hello, I'm your database assistant. What would you like to know?";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    /// Where conversation transcripts are persisted
    pub history_db: PathBuf,
    /// Database the assistant answers questions about (opened read-only)
    pub target_db: PathBuf,
    pub token_counter: TokenCounterKind,
    /// Max tokens a transcript sent to the backend may cost
    pub token_budget: u32,
    /// Headroom kept free under the budget for the next reply
    pub token_buffer: u32,
    /// Max messages sent to the backend per request
    pub max_messages_to_backend: usize,
    pub max_result_rows: usize,
    /// Function results are cut to this many tokens before narration
    pub max_function_result_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_output_tokens: Option<u32>,
    pub greeting: String,
}

fn dbchat_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".dbchat")
}

fn dbchat_config_json_path() -> PathBuf {
    dbchat_dir().join("config.json")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
            history_db: dbchat_dir().join("history.db"),
            target_db: PathBuf::from("target.db"),
            token_counter: TokenCounterKind::Tiktoken,
            token_budget: 3000,
            token_buffer: 100,
            max_messages_to_backend: 5,
            max_result_rows: 50,
            max_function_result_tokens: 1000,
            request_timeout_secs: 60,
            max_output_tokens: None,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Order: `explicit` path (TOML) if given, else `./dbchat.toml`, else
    /// `~/.dbchat/config.json`, else defaults. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_toml_file(path)?,
            None => {
                let local = Path::new(CONFIG_FILE_PATH);
                let json_path = dbchat_config_json_path();
                if local.exists() {
                    Self::from_toml_file(local)?
                } else if json_path.exists() {
                    Self::from_json_file(&json_path)?
                } else {
                    log::debug!("No config file found, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from an environment-like lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("OPENAI_API_KEY") {
            self.api_key = Some(api_key);
        }
        if let Some(api_base) = lookup("DBCHAT_API_BASE") {
            self.api_base = api_base;
        }
        if let Some(model) = lookup("DBCHAT_MODEL") {
            self.model = model;
        }
        if let Some(path) = lookup("DBCHAT_HISTORY_DB") {
            self.history_db = PathBuf::from(path);
        }
        if let Some(path) = lookup("DBCHAT_TARGET_DB") {
            self.target_db = PathBuf::from(path);
        }
        if let Some(kind) = lookup("DBCHAT_TOKEN_COUNTER") {
            match kind.parse() {
                Ok(kind) => self.token_counter = kind,
                Err(error) => log::warn!("Ignoring DBCHAT_TOKEN_COUNTER: {}", error),
            }
        }
        if let Some(budget) = lookup("DBCHAT_TOKEN_BUDGET") {
            match budget.trim().parse() {
                Ok(budget) => self.token_budget = budget,
                Err(_) => log::warn!("Ignoring non-numeric DBCHAT_TOKEN_BUDGET '{}'", budget),
            }
        }
        if let Some(max) = lookup("DBCHAT_MAX_MESSAGES") {
            match max.trim().parse() {
                Ok(max) => self.max_messages_to_backend = max,
                Err(_) => log::warn!("Ignoring non-numeric DBCHAT_MAX_MESSAGES '{}'", max),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token_buffer >= self.token_budget {
            return Err(ConfigError::Invalid(format!(
                "token_buffer ({}) must be smaller than token_budget ({})",
                self.token_buffer, self.token_budget
            )));
        }
        if self.max_messages_to_backend == 0 {
            return Err(ConfigError::Invalid(
                "max_messages_to_backend must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
