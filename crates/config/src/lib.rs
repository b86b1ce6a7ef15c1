//! Configuration loading, validation, and management for chatgate.
//!
//! Loads configuration from `~/.chatgate/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use chatgate_core::UnknownToolPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.chatgate/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// The completions service requests are forwarded to
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// The identity service bearer tokens are checked against
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Capability server fan-out
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// History windowing and system prompt
    #[serde(default)]
    pub context: ContextConfig,

    /// Local tool resolution
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Per-user capability server persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    7012
}
fn default_body_limit() -> usize {
    16 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible service (e.g. `http://proxy:7001/v1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

fn default_upstream_timeout() -> u64 {
    600
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_upstream_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL serving `GET /auth`; falls back to the upstream url
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// How long a validated token stays cached
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    360
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: None,
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Servers active for every user
    #[serde(default)]
    pub default_servers: Vec<String>,

    /// Per-server request timeout
    #[serde(default = "default_capability_timeout")]
    pub timeout_secs: u64,
}

fn default_capability_timeout() -> u64 {
    30
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            default_servers: vec![],
            timeout_secs: default_capability_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Approximate token ceiling for the forwarded conversation
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Base instructions placed ahead of tool guidance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_token_budget() -> usize {
    128_000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub unknown_tool_policy: UnknownToolPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sqlx connection string, or `:memory:` for a throwaway store
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    format!(
        "sqlite://{}",
        AppConfig::config_dir().join("capability_servers.db").display()
    )
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.chatgate/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CHATGATE_UPSTREAM_URL`, then `LLM_PROXY_ADDRESS`
    /// - `CHATGATE_IDENTITY_URL`
    /// - `CHATGATE_DEFAULT_SERVERS` (comma separated)
    /// - `CHATGATE_TOKEN_BUDGET`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load `path`, then apply the environment overrides `load` applies.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHATGATE_UPSTREAM_URL").or_else(|| lookup("LLM_PROXY_ADDRESS")) {
            self.upstream.url = Some(url);
        }

        if let Some(url) = lookup("CHATGATE_IDENTITY_URL") {
            self.identity.url = Some(url);
        }

        if let Some(servers) = lookup("CHATGATE_DEFAULT_SERVERS") {
            self.capabilities.default_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(budget) = lookup("CHATGATE_TOKEN_BUDGET") {
            self.context.token_budget = budget.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CHATGATE_TOKEN_BUDGET must be a positive integer, got '{budget}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chatgate")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.port == 0 {
            return Err(ConfigError::ValidationError("gateway.port must be > 0".into()));
        }

        if self.identity.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "identity.cache_ttl_secs must be > 0".into(),
            ));
        }

        if self.context.token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "context.token_budget must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The upstream base URL, without a trailing slash. Required to serve.
    pub fn upstream_url(&self) -> Result<String, ConfigError> {
        self.upstream
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                ConfigError::ValidationError(
                    "upstream.url is not set (or export CHATGATE_UPSTREAM_URL)".into(),
                )
            })
    }

    /// The identity base URL, defaulting to the upstream.
    pub fn identity_url(&self) -> Result<String, ConfigError> {
        match self.identity.url.as_deref() {
            Some(url) => Ok(url.trim_end_matches('/').to_string()),
            None => self.upstream_url(),
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 7012);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.identity.cache_ttl_secs, 360);
        assert_eq!(config.context.token_budget, 128_000);
        assert_eq!(config.tools.unknown_tool_policy, UnknownToolPolicy::Report);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.upstream.url = Some("http://proxy:7001/v1".into());
        config.capabilities.default_servers = vec!["http://caps:8000/v1".into()];
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.upstream.url, config.upstream.url);
        assert_eq!(parsed.capabilities.default_servers, config.capabilities.default_servers);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [upstream]
            url = "http://proxy/v1"

            [tools]
            unknown_tool_policy = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.gateway.port, 7012);
        assert_eq!(parsed.upstream.timeout_secs, 600);
        assert_eq!(parsed.tools.unknown_tool_policy, UnknownToolPolicy::Skip);
    }

    #[test]
    fn zero_values_rejected() {
        let mut config = AppConfig::default();
        config.context.token_budget = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.identity.cache_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gateway.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().gateway.port, 7012);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway]\nport = 9000\n").unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gateway\nport = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("LLM_PROXY_ADDRESS", "http://proxy/v1/"),
                ("CHATGATE_DEFAULT_SERVERS", "http://a/v1, ,http://b"),
                ("CHATGATE_TOKEN_BUDGET", "4096"),
            ]))
            .unwrap();
        assert_eq!(config.upstream_url().unwrap(), "http://proxy/v1");
        assert_eq!(config.identity_url().unwrap(), "http://proxy/v1");
        assert_eq!(config.capabilities.default_servers, vec!["http://a/v1", "http://b"]);
        assert_eq!(config.context.token_budget, 4096);
    }

    #[test]
    fn chatgate_upstream_wins_over_proxy_address() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("CHATGATE_UPSTREAM_URL", "http://primary"),
                ("LLM_PROXY_ADDRESS", "http://secondary"),
                ("CHATGATE_IDENTITY_URL", "http://id"),
            ]))
            .unwrap();
        assert_eq!(config.upstream_url().unwrap(), "http://primary");
        assert_eq!(config.identity_url().unwrap(), "http://id");
    }

    #[test]
    fn bad_token_budget_env_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env(env(&[("CHATGATE_TOKEN_BUDGET", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn upstream_url_required() {
        assert!(AppConfig::default().upstream_url().is_err());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("7012"));
        assert!(toml_str.contains("unknown_tool_policy = \"report\""));
    }
}
