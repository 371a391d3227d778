//! # LLM Providers
//!
//! Request/response translation for each provider family. Every call takes
//! the shared HTTP client and the agent's `ProviderConfig`.

mod anthropic;
mod gemini;
mod openai;

use reqwest::Client;
use secrecy::SecretString;
use std::time::Duration;

use crate::domain::config::{AgentConfig, ConfigError, resolve_secret};
use crate::infrastructure::llm::{Context, Error, Provider, Response};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for a provider
#[derive(Clone)]
pub struct ProviderConfig {
    pub api_key: SecretString,
    /// Base URL (for non-default endpoints)
    pub base_url: Option<String>,
    pub default_model: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn from_agent_config(
        name: &str,
        config: &AgentConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let section = format!("agents.{name}");
        let var = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| default_key_env(&config.provider).to_string());
        let api_key = resolve_secret(&section, &var, lookup)?;

        Ok(Self {
            api_key,
            base_url: config
                .endpoint
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            default_model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

/// Conventional key variable when an agent does not name one.
fn default_key_env(provider: &str) -> &'static str {
    match Provider::from_str(provider) {
        Some(Provider::Anthropic) => "ANTHROPIC_API_KEY",
        Some(Provider::Gemini) => "GOOGLE_API_KEY",
        Some(Provider::Groq) => "GROQ_API_KEY",
        Some(Provider::XAI) => "XAI_API_KEY",
        _ => "OPENAI_API_KEY",
    }
}

/// Execute a chat request with the specified provider
pub async fn chat(
    http: &Client,
    provider: Provider,
    config: &ProviderConfig,
    context: Context,
) -> Result<Response, Error> {
    match provider {
        Provider::OpenAI => openai::chat(http, config, "https://api.openai.com/v1", context).await,
        Provider::Groq => {
            openai::chat(http, config, "https://api.groq.com/openai/v1", context).await
        }
        Provider::XAI => openai::chat(http, config, "https://api.x.ai/v1", context).await,
        Provider::Anthropic => anthropic::chat(http, config, context).await,
        Provider::Gemini => gemini::chat(http, config, context).await,
    }
}

/// Turns a non-2xx answer into an error, preferring the API's own message.
async fn error_from_response(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error response".to_string());

    if let Ok(error_json) = serde_json::from_str::<serde_json::Value>(&error_text)
        && let Some(message) = error_json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
    {
        return Error::new(provider, format!("HTTP {status}: {message}"));
    }

    Error::new(provider, format!("HTTP {status}: {error_text}"))
}
