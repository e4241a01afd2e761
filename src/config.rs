//! Runtime configuration, persisted as TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. CLI flags are applied on top of the loaded values.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::llm::executor::RetryPolicy;
use crate::prompt::DEFAULT_MAX_BACKGROUND_CHARS;
use crate::prompt::background::BackgroundTable;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Generic gateway used for fully-qualified model identifiers.
    pub gateway: GatewayConfig,
    /// Native route for the `gemini` shortcut.
    pub gemini: NativeModelConfig,
    /// Native route for the `anthropic` shortcut.
    pub anthropic: NativeModelConfig,
    pub models: ModelsConfig,
    pub retry: RetryConfig,
    pub backgrounds: BackgroundConfig,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            gemini: NativeModelConfig::gemini(),
            anthropic: NativeModelConfig::anthropic(),
            models: ModelsConfig::default(),
            retry: RetryConfig::default(),
            backgrounds: BackgroundConfig::default(),
            timeout_secs: 120,
        }
    }
}

impl CleanConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load an explicit config file, or the first existing fallback, or defaults.
    pub fn discover(explicit: Option<&Path>, fallback: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match fallback {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Serialize to TOML, e.g. for `llm-clean config`.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "(in-memory)".into(),
            message: e.to_string(),
        })
    }
}

/// Gateway (OpenRouter-compatible) endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub url: String,
    pub credential_var: String,
    /// Sent as `HTTP-Referer` for gateway attribution.
    pub referer: String,
    /// Sent as `X-Title` for gateway attribution.
    pub title: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: "https://openrouter.ai/api/v1/chat/completions".into(),
            credential_var: "OPENROUTER_API_KEY".into(),
            referer: "https://github.com/leechuck/llm-clean".into(),
            title: "Ontological Analysis Tool".into(),
        }
    }
}

/// A provider-native chat-completions route behind a shortcut alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeModelConfig {
    /// Canonical `vendor/model` name recorded in results.
    pub canonical: String,
    /// Model name the provider's own API expects.
    pub wire_model: String,
    pub url: String,
    pub credential_var: String,
}

impl NativeModelConfig {
    pub fn gemini() -> Self {
        Self {
            canonical: "google/gemini-3-flash-preview".into(),
            wire_model: "gemini-3-flash-preview".into(),
            url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions".into(),
            credential_var: "GEMINI_API_KEY".into(),
        }
    }

    pub fn anthropic() -> Self {
        Self {
            canonical: "anthropic/claude-4.5-sonnet".into(),
            wire_model: "claude-sonnet-4-5".into(),
            url: "https://api.anthropic.com/v1/chat/completions".into(),
            credential_var: "ANTHROPIC_API_KEY".into(),
        }
    }
}

/// Which canonical model names may be used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub supported: BTreeSet<String>,
    /// Accept any well-formed `vendor/model` identifier.
    pub allow_unlisted: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            supported: [
                "google/gemini-3-flash-preview",
                "anthropic/claude-4.5-sonnet",
                "openai/gpt-4o",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            allow_unlisted: false,
        }
    }
}

/// Rate-limit retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total request attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first rate-limited attempt; doubles each time.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> ConfigResult<RetryPolicy> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidRetryPolicy {
                message: "max_attempts is 0".into(),
            });
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
        })
    }
}

/// Background material for the meta-property prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Character budget per background text.
    pub max_chars: usize,
    /// Load the per-property table when no single default file is given.
    pub use_defaults: bool,
    /// One file used for every property; replaces the table.
    pub default_file: Option<PathBuf>,
    pub table: BackgroundTable,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_BACKGROUND_CHARS,
            use_defaults: true,
            default_file: None,
            table: BackgroundTable::default(),
        }
    }
}
