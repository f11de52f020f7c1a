//! Agent configuration
//!
//! Centralized configuration loaded from `$HOME/.voxbot/config.toml`, with
//! serde defaults so partial files work, validation on load, and helpers for
//! resolving the on-disk state paths.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error occurred while reading/writing config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Decision-loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Sleep between iterations while the main mode is active (ms)
    pub main_interval_ms: u64,
    /// Sleep between iterations while combat is active (ms)
    pub combat_interval_ms: u64,
    /// Sleep for container modes and when no mode is active (ms)
    pub idle_interval_ms: u64,
    /// Backoff sleep after an interrupt or snapshot failure (ms)
    pub backoff_ms: u64,
    /// Run the LLM task-progress assessment every N iterations
    pub task_eval_every: u32,
    /// Drive decisions through the strategy pipeline instead of mode execution
    pub use_strategy_pipeline: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            main_interval_ms: 1000,
            combat_interval_ms: 250,
            idle_interval_ms: 2000,
            backoff_ms: 3000,
            task_eval_every: 5,
            use_strategy_pipeline: false,
        }
    }
}

impl LoopConfig {
    pub fn main_interval(&self) -> Duration {
        Duration::from_millis(self.main_interval_ms)
    }

    pub fn combat_interval(&self) -> Duration {
        Duration::from_millis(self.combat_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Goal/plan bookkeeping pacing and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Completion-check tick interval (ms)
    pub check_interval_ms: u64,
    /// Autosave interval (seconds)
    pub autosave_interval_secs: u64,
    /// Maximum retained task-history entries
    pub history_limit: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            autosave_interval_secs: 30,
            history_limit: 100,
        }
    }
}

impl PlanningConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }
}

/// LLM endpoint settings (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// API key; falls back to the `VOXBOT_API_KEY` environment variable
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Maximum completion tokens per request
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Transport retries before giving up on a request
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from config or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("VOXBOT_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Combat autopilot thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Engage hostiles within this distance (blocks)
    pub engage_radius: f64,
    /// Below this health, do not enter combat (half-hearts, 0-20 scale)
    pub retreat_health: f64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            engage_radius: 12.0,
            retreat_health: 6.0,
        }
    }
}

/// Container-GUI (chest/furnace) mode bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Maximum time a container mode may stay active (seconds)
    pub max_duration_secs: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 60,
        }
    }
}

impl ContainerConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Override for the state/history/memory directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default, rename = "loop")]
    pub loop_cfg: LoopConfig,
    #[serde(default)]
    pub planning: PlanningConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub combat: CombatConfig,
    #[serde(default)]
    pub container: ContainerConfig,
}

impl BotConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loop_cfg.main_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "loop.main_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.loop_cfg.task_eval_every == 0 {
            return Err(ConfigError::InvalidValue(
                "loop.task_eval_every must be greater than 0".to_string(),
            ));
        }
        if self.planning.check_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "planning.check_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.planning.autosave_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "planning.autosave_interval_secs must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.combat.engage_radius <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "combat.engage_radius must be greater than 0".to_string(),
            ));
        }
        if self.container.max_duration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "container.max_duration_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Default config path: `$HOME/.voxbot/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine home directory",
            ))
        })?;
        Ok(home_dir.join(".voxbot").join("config.toml"))
    }

    /// Load from the default path, writing a starter config if none exists
    pub async fn load_or_create() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        if path.exists() {
            Self::load_from(&path).await
        } else {
            let config = Self::default();
            let toml_string = toml::to_string_pretty(&config)?;
            fs::write(&path, toml_string).await?;
            tracing::info!(path = %path.display(), "created default config");
            Ok(config)
        }
    }

    /// Load and validate a config file
    pub async fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the data directory for state, history and memory files
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::data_dir()
            .map(|d| d.join("voxbot"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".voxbot")
                    .join("data")
            })
    }

    /// Planning-state file path
    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join("planning_state.json")
    }

    /// Task-execution-history file path
    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("task_history.json")
    }

    /// Experience-log file path
    pub fn memory_path(&self) -> PathBuf {
        self.data_dir().join("experiences.json")
    }
}
