//! # Integration Adapters
//!
//! One adapter per external system, each exposed to the planner as a single
//! tool. Only the integrations present in the configuration are built.

pub mod confluence;
pub mod github;
pub mod http;
pub mod jira;
pub mod n8n;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::application::registry::ToolRegistry;
use crate::domain::config::{ConfigError, IntegrationsConfig};
use crate::domain::traits::IntegrationAdapter;

pub use confluence::ConfluenceAdapter;
pub use github::GithubAdapter;
pub use jira::JiraAdapter;
pub use n8n::N8nAdapter;

/// Builds every configured adapter. Fails on the first missing credential.
pub fn build_adapters(
    config: &IntegrationsConfig,
    timeout: Duration,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<Arc<dyn IntegrationAdapter>>, ConfigError> {
    let mut adapters: Vec<Arc<dyn IntegrationAdapter>> = Vec::new();
    if let Some(jira) = &config.issue_tracker {
        adapters.push(Arc::new(JiraAdapter::from_config(jira, lookup)?.with_timeout(timeout)));
    }
    if let Some(wiki) = &config.wiki {
        adapters.push(Arc::new(ConfluenceAdapter::from_config(wiki, lookup)?.with_timeout(timeout)));
    }
    if let Some(github) = &config.source_host {
        adapters.push(Arc::new(GithubAdapter::from_config(github, lookup)?.with_timeout(timeout)));
    }
    if let Some(n8n) = &config.workflow {
        adapters.push(Arc::new(N8nAdapter::from_config(n8n, lookup)?.with_timeout(timeout)));
    }
    Ok(adapters)
}

pub fn build_registry(
    config: &IntegrationsConfig,
    timeout: Duration,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for adapter in build_adapters(config, timeout, lookup)? {
        registry.register(adapter).context("Failed to register integration")?;
    }
    if registry.is_empty() {
        tracing::warn!("No integrations configured; the bot can only answer from the model");
    }
    Ok(registry)
}

/// Credential values of the configured integrations, for redaction.
pub fn credential_values(
    config: &IntegrationsConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Vec<String> {
    let vars = [
        config.issue_tracker.as_ref().map(|c| c.api_token_env.as_str()),
        config.wiki.as_ref().map(|c| c.api_token_env.as_str()),
        config.source_host.as_ref().map(|c| c.token_env.as_str()),
        config.workflow.as_ref().map(|c| c.api_key_env.as_str()),
    ];
    vars.into_iter().flatten().filter_map(lookup).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{GithubConfig, JiraConfig, N8nConfig};

    fn config() -> IntegrationsConfig {
        IntegrationsConfig {
            issue_tracker: Some(JiraConfig {
                base_url: "https://acme.atlassian.net".into(),
                email: "bot@acme.com".into(),
                api_token_env: "JIRA_API_TOKEN".into(),
                project_keys: vec!["ID".into()],
                epic_link_field: None,
                default_project: None,
            }),
            wiki: None,
            source_host: Some(GithubConfig {
                base_url: "https://api.github.com".into(),
                token_env: "GITHUB_TOKEN".into(),
                default_repo: Some("acme/web".into()),
                max_results: 50,
            }),
            workflow: Some(N8nConfig {
                base_url: "http://n8n.internal:5678".into(),
                api_key_env: "N8N_API_KEY".into(),
            }),
        }
    }

    fn env(var: &str) -> Option<String> {
        match var {
            "JIRA_API_TOKEN" => Some("jira-secret".into()),
            "GITHUB_TOKEN" => Some("ghp_secret".into()),
            "N8N_API_KEY" => Some("n8n-secret".into()),
            _ => None,
        }
    }

    #[test]
    fn test_only_configured_integrations_are_registered() {
        let registry = build_registry(&config(), Duration::from_secs(5), &env).unwrap();

        let names: Vec<&str> = registry.list().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["issue_tracker", "source_host", "workflow"]);
    }

    #[test]
    fn test_missing_credential_fails_startup() {
        let lookup = |var: &str| if var == "GITHUB_TOKEN" { None } else { env(var) };

        let err = build_adapters(&config(), Duration::from_secs(5), &lookup).err().unwrap();

        assert_eq!(
            err,
            ConfigError::MissingCredential {
                section: "integrations.source_host".into(),
                var: "GITHUB_TOKEN".into(),
            }
        );
    }

    #[test]
    fn test_credential_values_are_collected() {
        let mut values = credential_values(&config(), &env);
        values.sort();
        assert_eq!(values, vec!["ghp_secret", "jira-secret", "n8n-secret"]);
    }
}
