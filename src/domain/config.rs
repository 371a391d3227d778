//! # Configuration
//!
//! Manages the loading and validation of the application's configuration file (`config.yaml`).
//! Defines the structs for the chat service, reasoning agents, integrations and orchestration limits.
//! Credentials are never stored in the file; each section names the environment variable holding them.

use anyhow::Context as _;
use reqwest::Url;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Startup-time configuration problems. Any of these prevents the service from starting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{section}: required credential variable {var} is not set")]
    MissingCredential { section: String, var: String },

    #[error("{section}: malformed base URL '{url}': {reason}")]
    InvalidBaseUrl {
        section: String,
        url: String,
        reason: String,
    },

    #[error("planner agent '{0}' is not defined under `agents`")]
    UnknownAgent(String),

    #[error("agent '{agent}' uses unknown provider '{provider}'")]
    UnknownProvider { agent: String, provider: String },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Main application configuration structure.
/// Matches the layout of `data/config.yaml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    pub planner: PlannerConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

impl AppConfig {
    /// Reads and parses a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Checks everything that does not need the environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.agents.contains_key(&self.planner.agent) {
            return Err(ConfigError::UnknownAgent(self.planner.agent.clone()));
        }
        self.orchestration.validate()?;

        if let Some(jira) = &self.integrations.issue_tracker {
            parse_base_url("integrations.issue_tracker", &jira.base_url)?;
        }
        if let Some(wiki) = &self.integrations.wiki {
            parse_base_url("integrations.wiki", &wiki.base_url)?;
        }
        if let Some(github) = &self.integrations.source_host {
            parse_base_url("integrations.source_host", &github.base_url)?;
        }
        if let Some(n8n) = &self.integrations.workflow {
            parse_base_url("integrations.workflow", &n8n.base_url)?;
        }
        parse_base_url("services.slack", &self.services.slack.api_base)?;
        for (name, agent) in &self.agents {
            if let Some(endpoint) = &agent.endpoint {
                parse_base_url(&format!("agents.{name}"), endpoint)?;
            }
        }
        Ok(())
    }

    /// Agent selected for planning. Only valid after `validate`.
    pub fn planner_agent(&self) -> Result<&AgentConfig, ConfigError> {
        self.agents
            .get(&self.planner.agent)
            .ok_or_else(|| ConfigError::UnknownAgent(self.planner.agent.clone()))
    }
}

/// Parses an http(s) base URL, rejecting anything else.
pub fn parse_base_url(section: &str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        section: section.to_string(),
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Resolves a credential from the environment through `lookup`.
/// Empty values count as missing.
pub fn resolve_secret(
    section: &str,
    var: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => Ok(SecretString::new(value)),
        _ => Err(ConfigError::MissingCredential {
            section: section.to_string(),
            var: var.to_string(),
        }),
    }
}

/// Reads variables from the process environment.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Configuration for the connected chat service.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ServicesConfig {
    #[serde(default)]
    pub slack: SlackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    #[serde(default = "default_slack_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_slack_secret_env")]
    pub signing_secret_env: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_slack_api")]
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_slack_token_env(),
            signing_secret_env: default_slack_secret_env(),
            bind: default_bind(),
            api_base: default_slack_api(),
        }
    }
}

fn default_slack_token_env() -> String {
    "SLACK_BOT_TOKEN".to_string()
}
fn default_slack_secret_env() -> String {
    "SLACK_SIGNING_SECRET".to_string()
}
fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_slack_api() -> String {
    "https://slack.com/api".to_string()
}

pub type AgentsConfig = HashMap<String, AgentConfig>;

/// A named reasoning agent.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>, // e.g. "GOOGLE_API_KEY"
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    pub agent: String,
}

/// External systems exposed as tools. Unset sections are not registered.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct IntegrationsConfig {
    #[serde(default)]
    pub issue_tracker: Option<JiraConfig>,
    #[serde(default)]
    pub wiki: Option<ConfluenceConfig>,
    #[serde(default)]
    pub source_host: Option<GithubConfig>,
    #[serde(default)]
    pub workflow: Option<N8nConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    #[serde(default = "default_jira_token_env")]
    pub api_token_env: String,
    /// Project keys the planner is told about (e.g. `ID`, `WL`, `MS`)
    #[serde(default)]
    pub project_keys: Vec<String>,
    /// Custom field holding the epic link on company-managed projects
    #[serde(default)]
    pub epic_link_field: Option<String>,
    /// Project used by `create` when the request names none
    #[serde(default)]
    pub default_project: Option<String>,
}

fn default_jira_token_env() -> String {
    "JIRA_API_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceConfig {
    pub base_url: String,
    pub email: String,
    #[serde(default = "default_confluence_token_env")]
    pub api_token_env: String,
}

fn default_confluence_token_env() -> String {
    "CONFLUENCE_API_TOKEN".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_github_api")]
    pub base_url: String,
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
    /// `owner/name` used when the planner omits `repo`
    #[serde(default)]
    pub default_repo: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_max_results() -> u32 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct N8nConfig {
    pub base_url: String,
    #[serde(default = "default_n8n_key_env")]
    pub api_key_env: String,
}

fn default_n8n_key_env() -> String {
    "N8N_API_KEY".to_string()
}

/// Limits for the plan/execute loop and the reply.
#[derive(Debug, Deserialize, Clone)]
pub struct OrchestrationConfig {
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
    /// Post long replies as several messages instead of truncating
    #[serde(default)]
    pub split_long_replies: bool,
    #[serde(default = "default_turn_budget")]
    pub turn_budget_secs: u64,
    #[serde(default = "default_invocation_timeout")]
    pub invocation_timeout_secs: u64,
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_calls")]
    pub max_calls_per_plan: usize,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_reply_chars: default_max_reply_chars(),
            split_long_replies: false,
            turn_budget_secs: default_turn_budget(),
            invocation_timeout_secs: default_invocation_timeout(),
            fan_out: default_fan_out(),
            max_iterations: default_max_iterations(),
            max_calls_per_plan: default_max_calls(),
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestrationConfig {
    pub fn turn_budget(&self) -> Duration {
        Duration::from_secs(self.turn_budget_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::InvalidValue {
            field,
            reason: reason.to_string(),
        };
        if self.max_reply_chars < 64 {
            return Err(invalid("orchestration.max_reply_chars", "must be at least 64"));
        }
        if self.turn_budget_secs == 0 {
            return Err(invalid("orchestration.turn_budget_secs", "must be positive"));
        }
        if self.invocation_timeout_secs == 0 {
            return Err(invalid("orchestration.invocation_timeout_secs", "must be positive"));
        }
        if self.fan_out == 0 {
            return Err(invalid("orchestration.fan_out", "must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(invalid("orchestration.max_iterations", "must be at least 1"));
        }
        if self.max_calls_per_plan == 0 {
            return Err(invalid("orchestration.max_calls_per_plan", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("orchestration.retry.max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

fn default_max_reply_chars() -> usize {
    4000
}
fn default_turn_budget() -> u64 {
    60
}
fn default_invocation_timeout() -> u64 {
    20
}
fn default_fan_out() -> usize {
    4
}
fn default_max_iterations() -> u32 {
    3
}
fn default_max_calls() -> usize {
    8
}

/// Retry bounds for rate-limited and timed-out invocations.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}

/// System-level settings for the bot.
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    /// Directory holding `session.log`
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}
