//! Configuration loading and config file resolution
//!
//! Every section and field of the TOML file is optional. Anything missing
//! falls back to a built-in default, so an absent default config file is not
//! an error.
//!
//! # Config file priority
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`MMPS_CONFIG`)
//! 3. `<config_dir>/mmps/config.toml`
//! 4. Built-in defaults
//!
//! # API key priority
//! 1. `MMPS_API_KEY`
//! 2. `OPENAI_API_KEY`
//! 3. TOML `[generation] api_key`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MMPS_CONFIG";

/// Environment variables checked for the API key, highest priority first
pub const API_KEY_ENV_VARS: [&str; 2] = ["MMPS_API_KEY", "OPENAI_API_KEY"];

/// Default system directive sent as the first message of every conversation
pub const DEFAULT_SYSTEM_DIRECTIVE: &str = "You are an expert in solving problems and analysis. \
Use pseudo code to describe functionality and logic to developer working in any computer language.";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    pub generation: GenerationConfig,
    pub schedule: ScheduleConfig,
    pub scoring: ScoringConfig,
    pub prompts: PromptConfig,
    pub logging: LoggingConfig,
}

/// `[generation]` - text-generation service connection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// API key (lowest priority source, see module docs)
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Model used by stages 1-4
    pub fast_model: String,
    /// Model used by stage 5 and scoring
    pub strong_model: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Client-side request rate limit (0 disables)
    pub requests_per_second: u32,
    /// Retries per failed generation call (0 = fail on first error)
    pub max_retries: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            fast_model: "gpt-4o-mini".to_string(),
            strong_model: "gpt-4o".to_string(),
            request_timeout_secs: 120,
            requests_per_second: 0,
            max_retries: 0,
        }
    }
}

/// Which layer-3/4 entries stage 5 reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryScope {
    /// Everything stored so far by every instance
    #[default]
    Global,
    /// Only the entries written by the summarizing instance
    Instance,
}

/// What the scheduler does when one instance fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// First failure aborts the whole run
    #[default]
    AbortRun,
    /// Failed instances are dropped; survivors go on to scoring
    ExcludeFailed,
}

/// `[schedule]` - instance count and linear sampling schedule
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub instances: usize,
    /// Worker pool size (defaults to `instances`)
    pub workers: Option<usize>,
    pub base_temperature: f32,
    pub temperature_step: f32,
    pub base_max_tokens: u32,
    pub max_tokens_step: u32,
    /// Output budget for stage 5, shared by every instance
    pub summary_max_tokens: u32,
    pub summary_scope: SummaryScope,
    pub failure_policy: FailurePolicy,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            instances: 3,
            workers: None,
            base_temperature: 0.3,
            temperature_step: 0.2,
            base_max_tokens: 100,
            max_tokens_step: 200,
            summary_max_tokens: 2000,
            summary_scope: SummaryScope::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// `[scoring]` - comparative scoring call
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 20,
        }
    }
}

/// `[prompts]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system_directive: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_directive: DEFAULT_SYSTEM_DIRECTIVE.to_string(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for session audit files (current directory if unset)
    pub directory: Option<PathBuf>,
    /// Write a per-session audit file
    pub audit: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            audit: true,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}

/// Default config file location for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mmps").join("config.toml"))
}

/// Config file to load, following the module-level priority order
///
/// An explicitly named file (CLI or environment) is returned even if it does
/// not exist, so loading it reports the error. The platform default file is
/// returned only when present; `None` means built-in defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|path| path.exists())
}

/// Load the resolved config file, or defaults when there is none
pub fn load_config(path: Option<&Path>) -> Result<TomlConfig> {
    match path {
        Some(path) => TomlConfig::load(path),
        None => Ok(TomlConfig::default()),
    }
}

/// Resolve the generation API key from environment and TOML
pub fn resolve_api_key(config: &TomlConfig) -> Result<String> {
    let mut found: Vec<(&str, String)> = API_KEY_ENV_VARS
        .iter()
        .filter_map(|name| {
            std::env::var(name)
                .ok()
                .filter(|key| is_valid_key(key))
                .map(|key| (*name, key))
        })
        .collect();

    if let Some(key) = config.generation.api_key.as_ref().filter(|k| is_valid_key(k)) {
        found.push(("TOML", key.clone()));
    }

    if found.len() > 1 {
        let sources: Vec<&str> = found.iter().map(|(source, _)| *source).collect();
        warn!(
            "API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match found.into_iter().next() {
        Some((source, key)) => {
            info!("API key loaded from {}", source);
            Ok(key)
        }
        None => Err(Error::Config(
            "API key not configured. Please configure using one of:\n\
             1. Environment: MMPS_API_KEY=your-key-here\n\
             2. Environment: OPENAI_API_KEY=your-key-here\n\
             3. TOML config: [generation] api_key = \"your-key\""
                .to_string(),
        )),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
