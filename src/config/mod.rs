//! Configuration management for femtoclaw
//!
//! Configuration is loaded from `~/.femtoclaw/config.json` with environment
//! variable overrides of the form `FEMTOCLAW_SECTION_SUBSECTION_KEY`.

mod types;

pub use types::*;

use crate::error::Result;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the femtoclaw configuration directory path (~/.femtoclaw)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".femtoclaw")
    }

    /// Returns the path to the config file (~/.femtoclaw/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` as the environment source.
    fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = &mut self.agents.defaults;
        if let Some(val) = lookup("FEMTOCLAW_AGENTS_DEFAULTS_WORKSPACE") {
            defaults.workspace = val;
        }
        if let Some(val) = lookup("FEMTOCLAW_AGENTS_DEFAULTS_MODEL") {
            defaults.model = val;
        }
        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_AGENTS_DEFAULTS_MAX_TOKENS") {
            defaults.max_tokens = v;
        }
        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_AGENTS_DEFAULTS_TEMPERATURE") {
            defaults.temperature = v;
        }
        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS") {
            defaults.max_tool_iterations = v;
        }
        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_AGENTS_DEFAULTS_AGENT_TIMEOUT_SECS") {
            defaults.agent_timeout_secs = v;
        }

        if let Some(val) = lookup("FEMTOCLAW_PROVIDERS_OPENAI_API_KEY") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_key = Some(val);
        }
        if let Some(val) = lookup("FEMTOCLAW_PROVIDERS_OPENAI_API_BASE") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_base = Some(val);
        }

        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_SESSION_HISTORY_LIMIT") {
            self.session.history_limit = v;
        }
        if let Some(v) = parse_env(&lookup, "FEMTOCLAW_SCHEDULER_POLL_INTERVAL_MS") {
            self.scheduler.poll_interval_ms = v;
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the expanded workspace path (resolves ~ to home directory)
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.agents.defaults.workspace)
    }

    /// Directory holding one JSONL file per session.
    pub fn sessions_path(&self) -> PathBuf {
        match &self.session.path {
            Some(p) => expand_home(p),
            None => Self::dir().join("sessions"),
        }
    }

    /// Path of the scheduler's job store.
    pub fn cron_store_path(&self) -> PathBuf {
        match &self.scheduler.store_path {
            Some(p) => expand_home(p),
            None => Self::dir().join("cron").join("jobs.json"),
        }
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|val| val.trim().parse().ok())
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return match rest.strip_prefix('/') {
                Some(tail) => home.join(tail),
                None if rest.is_empty() => home,
                None => PathBuf::from(path),
            };
        }
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agents.defaults.max_tokens, 8192);
        assert_eq!(config.agents.defaults.max_tool_iterations, 20);
        assert_eq!(config.agents.defaults.agent_timeout_secs, 300);
        assert_eq!(config.session.history_limit, 50);
        assert_eq!(config.scheduler.poll_interval_ms, 1_000);
        assert!(config.bus.inbound_capacity.is_none());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"agents": {"defaults": {"model": "local-model"}}, "session": {"history_limit": 8}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.agents.defaults.model, "local-model");
        assert_eq!(config.agents.defaults.max_tokens, 8192);
        assert_eq!(config.session.history_limit, 8);
        assert_eq!(config.logging.format, LogFormat::Component);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from_path(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, 1_000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.scheduler.store_path = Some("/tmp/jobs.json".to_string());
        config.save_to_path(&path).unwrap();

        let loaded: Config =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.scheduler.store_path.as_deref(), Some("/tmp/jobs.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FEMTOCLAW_AGENTS_DEFAULTS_MODEL", "override-model"),
            ("FEMTOCLAW_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS", "7"),
            ("FEMTOCLAW_AGENTS_DEFAULTS_TEMPERATURE", "not-a-number"),
            ("FEMTOCLAW_PROVIDERS_OPENAI_API_KEY", "sk-test"),
            ("FEMTOCLAW_SESSION_HISTORY_LIMIT", "12"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.agents.defaults.model, "override-model");
        assert_eq!(config.agents.defaults.max_tool_iterations, 7);
        assert_eq!(config.agents.defaults.temperature, 0.7);
        assert_eq!(
            config.providers.openai.and_then(|p| p.api_key).as_deref(),
            Some("sk-test")
        );
        assert_eq!(config.session.history_limit, 12);
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/.femtoclaw/workspace");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with(".femtoclaw/workspace"));
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
    }
}
