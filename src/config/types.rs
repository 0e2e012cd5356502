//! Configuration type definitions for femtoclaw
//!
//! Every struct is `#[serde(default)]` so a partial `config.json` fills the
//! missing fields from the defaults below.

use serde::{Deserialize, Serialize};

/// Main configuration struct for femtoclaw
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent configuration (models, tokens, iterations)
    pub agents: AgentConfig,
    /// LLM provider configurations
    pub providers: ProvidersConfig,
    /// Session persistence and history replay
    pub session: SessionConfig,
    /// Background job scheduler
    pub scheduler: SchedulerConfig,
    /// Message bus queue sizing
    pub bus: BusConfig,
    /// Skills discovery
    pub skills: SkillsConfig,
    /// Log output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Default agent settings
    pub defaults: AgentDefaults,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Workspace directory path
    pub workspace: String,
    /// Default model to use
    pub model: String,
    /// Maximum tokens for responses
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tool iterations per turn
    pub max_tool_iterations: u32,
    /// Maximum wall-clock time (seconds) for a single turn. 0 disables it.
    pub agent_timeout_secs: u64,
}

/// Default model compile-time configuration.
/// Set `FEMTOCLAW_DEFAULT_MODEL` at compile time to override.
const COMPILE_TIME_DEFAULT_MODEL: &str = match option_env!("FEMTOCLAW_DEFAULT_MODEL") {
    Some(v) => v,
    None => "gpt-4o-mini",
};

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: "~/.femtoclaw/workspace".to_string(),
            model: COMPILE_TIME_DEFAULT_MODEL.to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_iterations: 20,
            agent_timeout_secs: 300,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// All LLM provider configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI-compatible endpoint configuration
    pub openai: Option<ProviderConfig>,
    /// Retry behavior for runtime provider calls
    pub retry: RetryConfig,
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom API base URL
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Retry behavior for runtime provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable automatic retry for transient provider errors.
    pub enabled: bool,
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds for exponential backoff.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

// ============================================================================
// Session / Scheduler / Bus
// ============================================================================

/// Session persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of most recent turns replayed to the model.
    pub history_limit: usize,
    /// Override for the sessions directory (defaults to `~/.femtoclaw/sessions`).
    pub path: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            path: None,
        }
    }
}

/// Background scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run the scheduler in gateway mode.
    pub enabled: bool,
    /// Polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Override for the job store (defaults to `~/.femtoclaw/cron/jobs.json`).
    pub store_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
            store_path: None,
        }
    }
}

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BusConfig {
    /// Inbound queue capacity. `None` means unbounded; with a bound,
    /// publishers wait for space instead of dropping.
    pub inbound_capacity: Option<usize>,
}

// ============================================================================
// Skills Configuration
// ============================================================================

/// Skills system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Enable or disable the skills system.
    pub enabled: bool,
    /// Optional workspace skills directory override.
    pub workspace_dir: Option<String>,
    /// Skills that should always be injected into context.
    pub always_load: Vec<String>,
    /// Skills to hide by name.
    pub disabled: Vec<String>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workspace_dir: None,
            always_load: Vec::new(),
            disabled: Vec::new(),
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    Pretty,
    /// Compact single-line output with component fields
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional file to append JSON logs to.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Component,
            file: None,
        }
    }
}
