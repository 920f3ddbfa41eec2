//! Configuration loading, validation, and management for Swarmline.
//!
//! Loads configuration from `~/.swarmline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swarmline_core::{AgentProfile, ToolDiscipline};

/// The root configuration structure.
///
/// Maps directly to `~/.swarmline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default completion provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent that owns the active slot at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,

    /// Continuation and loop settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Inter-agent messaging settings
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// The agent population
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("default_agent", &self.default_agent)
            .field("runtime", &self.runtime)
            .field("retry", &self.retry)
            .field("mailbox", &self.mailbox)
            .field("tools", &self.tools)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .field("agents", &self.agents)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Continuation engine and output-shape settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hard global ceiling on iterations per drive
    #[serde(default = "default_iteration_ceiling")]
    pub iteration_ceiling: u32,

    /// Per-task bound applied to agents that do not set their own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_max_iterations: Option<u32>,

    #[serde(default)]
    pub tool_discipline: ToolDiscipline,

    /// Max lines in `final` before a warning is raised
    #[serde(default = "default_final_line_budget")]
    pub final_line_budget: usize,

    /// Line budget when the caller asked for detail
    #[serde(default = "default_detailed_line_budget")]
    pub detailed_line_budget: usize,
}

fn default_iteration_ceiling() -> u32 {
    50
}
fn default_final_line_budget() -> usize {
    4
}
fn default_detailed_line_budget() -> usize {
    40
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            iteration_ceiling: default_iteration_ceiling(),
            task_max_iterations: None,
            tool_discipline: ToolDiscipline::default(),
            final_line_budget: default_final_line_budget(),
            detailed_line_budget: default_detailed_line_budget(),
        }
    }
}

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    250
}
fn default_max_backoff_ms() -> u64 {
    4_000
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Deadline applied to BLOCKING sends that do not carry their own
    #[serde(default = "default_deadline_secs")]
    pub default_deadline_secs: u64,

    /// Maximum nesting of switch-and-return chains
    #[serde(default = "default_max_switch_depth")]
    pub max_switch_depth: usize,

    /// Upper bound on a per-message `deadline_secs`
    #[serde(default = "default_max_deadline_secs")]
    pub max_deadline_secs: u64,
}

fn default_deadline_secs() -> u64 {
    120
}
fn default_max_deadline_secs() -> u64 {
    3600
}
fn default_max_switch_depth() -> usize {
    5
}

impl MailboxConfig {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_secs(self.default_deadline_secs)
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            default_deadline_secs: default_deadline_secs(),
            max_switch_depth: default_max_switch_depth(),
            max_deadline_secs: default_max_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-invocation timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,

    /// Root directory the filesystem tools are confined to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            workspace_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.swarmline/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `SWARMLINE_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
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

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("SWARMLINE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("SWARMLINE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("SWARMLINE_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".swarmline")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Root the filesystem tools operate in.
    pub fn tool_root(&self) -> PathBuf {
        self.tools
            .workspace_root
            .clone()
            .unwrap_or_else(Self::workspace_dir)
    }

    /// The configured agents, or a single general-purpose assistant.
    pub fn effective_agents(&self) -> Vec<AgentProfile> {
        if self.agents.is_empty() {
            vec![AgentProfile::new("assistant").with_role("general assistant")]
        } else {
            self.agents.clone()
        }
    }

    /// The agent that starts out active.
    pub fn initial_agent(&self) -> String {
        self.default_agent
            .clone()
            .or_else(|| self.effective_agents().first().map(|a| a.name.clone()))
            .unwrap_or_else(|| "assistant".into())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.runtime.iteration_ceiling == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.iteration_ceiling must be at least 1".into(),
            ));
        }

        if self.runtime.task_max_iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "runtime.task_max_iterations must be at least 1".into(),
            ));
        }

        if self.runtime.final_line_budget == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.final_line_budget must be at least 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }

        if self.mailbox.max_switch_depth == 0 {
            return Err(ConfigError::ValidationError(
                "mailbox.max_switch_depth must be at least 1".into(),
            ));
        }

        if self.mailbox.max_deadline_secs < self.mailbox.default_deadline_secs {
            return Err(ConfigError::ValidationError(
                "mailbox.max_deadline_secs must not be below mailbox.default_deadline_secs".into(),
            ));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("agent name must not be empty".into()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }

        if let Some(default_agent) = &self.default_agent
            && !self.effective_agents().iter().any(|a| &a.name == default_agent)
        {
            return Err(ConfigError::ValidationError(format!(
                "default_agent '{default_agent}' is not a configured agent"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            default_agent: None,
            runtime: RuntimeConfig::default(),
            retry: RetryConfig::default(),
            mailbox: MailboxConfig::default(),
            tools: ToolsConfig::default(),
            gateway: GatewayConfig::default(),
            providers: HashMap::new(),
            agents: vec![],
        }
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

impl From<ConfigError> for swarmline_core::Error {
    fn from(err: ConfigError) -> Self {
        swarmline_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.runtime.iteration_ceiling, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.mailbox.max_switch_depth, 5);
        assert_eq!(config.runtime.tool_discipline, ToolDiscipline::Single);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig {
            agents: vec![AgentProfile::new("alice"), AgentProfile::new("bob").with_max_iterations(4)],
            ..AppConfig::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.agents.len(), 2);
        assert_eq!(parsed.agents[1].max_iterations, Some(4));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.runtime.iteration_ceiling = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn deadline_cap_below_default_rejected() {
        let mut config = AppConfig::default();
        config.mailbox.default_deadline_secs = 600;
        config.mailbox.max_deadline_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_agents_rejected() {
        let config = AppConfig {
            agents: vec![AgentProfile::new("alice"), AgentProfile::new("alice")],
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate agent name"));
    }

    #[test]
    fn unknown_default_agent_rejected() {
        let config = AppConfig {
            default_agent: Some("carol".into()),
            agents: vec![AgentProfile::new("alice")],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file_with_agents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_agent = "bob"

[runtime]
iteration_ceiling = 10
tool_discipline = "batch"

[mailbox]
default_deadline_secs = 30

[[agents]]
name = "alice"
role = "planner"
tools = ["list_directory", "send_mail"]

[[agents]]
name = "bob"
max_iterations = 3
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.runtime.iteration_ceiling, 10);
        assert_eq!(config.runtime.tool_discipline, ToolDiscipline::Batch);
        assert_eq!(config.mailbox.default_deadline(), Duration::from_secs(30));
        assert_eq!(config.initial_agent(), "bob");
        assert_eq!(config.agents[0].tools, vec!["list_directory", "send_mail"]);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "runtime = [not valid").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn effective_agents_falls_back_to_assistant() {
        let config = AppConfig::default();
        let agents = config.effective_agents();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "assistant");
        assert_eq!(config.initial_agent(), "assistant");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("iteration_ceiling = 50"));
    }
}
