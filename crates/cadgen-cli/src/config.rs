//! Configuration file support

use cadgen_ai::{Provider, RetryPolicy};
use cadgen_pipeline::{MAX_REPAIR_ATTEMPTS, Session};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for cadgen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default provider (anthropic, openai, google)
    pub provider: String,
    /// Model per provider; unset entries use the provider default
    pub models: PerProvider,
    /// API keys (alternative to environment variables)
    pub api_keys: PerProvider,
    /// Output token cap per request
    pub max_tokens: u32,
    /// Repair attempts used by `/retry` and `--retry` without a count
    pub max_retries: u32,
    /// Check repair replies for a code block before executing them
    pub validate_repairs: bool,
    /// Directory exports are written to, relative to the working directory
    pub output_dir: String,
    /// Interpreter that runs generated programs
    pub python: String,
    pub exec_timeout_secs: u64,
    pub backoff: Backoff,
}

/// One optional value per provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerProvider {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub google: Option<String>,
}

impl PerProvider {
    pub fn get(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Anthropic => self.anthropic.as_deref(),
            Provider::OpenAI => self.openai.as_deref(),
            Provider::Google => self.google.as_deref(),
        }
        .filter(|value| !value.trim().is_empty())
    }
}

/// Rate-limit backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Backoff {
    pub max_attempts: u32,
    pub delays_secs: Vec<u64>,
    pub retryable_statuses: Vec<u16>,
}

impl Default for Backoff {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delays_secs: policy.delays.iter().map(Duration::as_secs).collect(),
            retryable_statuses: policy.retryable_statuses,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic.id().to_string(),
            models: PerProvider::default(),
            api_keys: PerProvider::default(),
            max_tokens: 4096,
            max_retries: 3,
            validate_repairs: false,
            output_dir: "output".to_string(),
            python: "python3".to_string(),
            exec_timeout_secs: 120,
            backoff: Backoff::default(),
        }
    }
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadgen")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CADGEN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, falling back to defaults with a warning
    pub fn load_from(path: &Path) -> Self {
        tracing::debug!("loading config from {}", path.display());
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    /// Configured default provider
    pub fn provider(&self) -> anyhow::Result<Provider> {
        Ok(self.provider.parse()?)
    }

    /// Model for `provider`, or its default
    pub fn model(&self, provider: Provider) -> String {
        self.models
            .get(provider)
            .unwrap_or(provider.default_model())
            .to_string()
    }

    /// Get API key for a provider, checking config then env
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        self.api_key_with(provider, |name| std::env::var(name).ok())
    }

    fn api_key_with(&self, provider: Provider, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        if let Some(key) = self.api_keys.get(provider) {
            return Some(key.to_string());
        }

        let mut names = vec![provider.api_key_env_var()];
        if provider == Provider::Google {
            names.push("GEMINI_API_KEY");
        }
        names
            .into_iter()
            .filter_map(|name| env(name))
            .find(|key| !key.trim().is_empty())
    }

    /// Repair attempts, clamped to the supported range
    pub fn max_retries(&self) -> u32 {
        self.max_retries.clamp(1, MAX_REPAIR_ATTEMPTS)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.backoff.max_attempts.max(1),
            delays: self
                .backoff
                .delays_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            retryable_statuses: self.backoff.retryable_statuses.clone(),
        }
    }

    /// Session holding every provider's configured model and key
    pub fn session(&self, provider: Provider) -> Session {
        let mut session = Session::new(provider);
        for p in Provider::ALL {
            session.set_model(p, self.model(p));
            if let Some(key) = self.api_key(p) {
                session.set_api_key(p, key);
            }
        }
        session
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# cadgen configuration file
# Place at ~/.config/cadgen/config.toml (Linux/Mac) or %APPDATA%\cadgen\config.toml (Windows)
# or point CADGEN_CONFIG_PATH at it.

# Default provider (anthropic, openai, google)
provider = "anthropic"

# Output token cap per request
max_tokens = 4096

# Repair attempts for /retry (1-10)
max_retries = 3

# Require a code block in repair replies before executing them
validate_repairs = false

# Where exports land, relative to the working directory
output_dir = "output"

# Interpreter with build123d installed
python = "python3"
exec_timeout_secs = 120

[models]
# anthropic = "claude-opus-4-6"
# openai = "gpt-4o"
# google = "gemini-2.5-flash"

# API keys (optional - can also use ANTHROPIC_API_KEY, OPENAI_API_KEY,
# GOOGLE_API_KEY or GEMINI_API_KEY)
[api_keys]
# anthropic = "sk-ant-..."
# openai = "sk-..."
# google = "..."

# Waits between calls when a provider reports rate limiting or overload
[backoff]
max_attempts = 3
delays_secs = [15, 30]
retryable_statuses = [429, 503, 529]
"#
}
