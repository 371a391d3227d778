//! # LLM Client
//!
//! Provides the `Client` struct, the reasoning service as the planner sees
//! it. One client is built per configured agent and routes every completion
//! to that agent's provider.

use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Instant;

use crate::domain::config::{AgentConfig, ConfigError};
use crate::domain::traits::LlmProvider;
use crate::infrastructure::llm::providers::{self, ProviderConfig};
use crate::infrastructure::llm::{Context, Error, Provider, Response};

pub struct Client {
    http: reqwest::Client,
    agent: String,
    provider: Provider,
    config: ProviderConfig,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl Client {
    /// Builds the client for agent `name`, resolving its key through `lookup`.
    pub fn from_agent(
        name: &str,
        agent: &AgentConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let provider = Provider::from_str(&agent.provider).ok_or_else(|| ConfigError::UnknownProvider {
            agent: name.to_string(),
            provider: agent.provider.clone(),
        })?;
        let config = ProviderConfig::from_agent_config(name, agent, lookup)?;

        Ok(Self {
            http: reqwest::Client::new(),
            agent: name.to_string(),
            provider,
            config,
            temperature: agent.temperature,
            max_tokens: agent.max_tokens,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// API key, for registering with the redactor.
    pub fn credential(&self) -> &SecretString {
        &self.config.api_key
    }

    /// Send a system prompt and a user prompt to the agent
    pub async fn prompt(&self, system: &str, prompt: &str) -> Result<Response, Error> {
        let context = Context::new()
            .add_system_message(system)
            .add_user_message(prompt)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let context = if self.config.default_model.is_empty() {
            context
        } else {
            context.with_model(self.config.default_model.clone())
        };

        providers::chat(&self.http, self.provider, &self.config, context).await
    }
}

#[async_trait]
impl LlmProvider for Client {
    async fn completion(&self, system: &str, prompt: &str) -> Result<String, String> {
        let started = Instant::now();
        match self.prompt(system, prompt).await {
            Ok(response) => {
                tracing::debug!(
                    agent = %self.agent,
                    model = %response.model,
                    prompt_tokens = response.usage.prompt_tokens,
                    completion_tokens = response.usage.completion_tokens,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "Completion received"
                );
                Ok(response.content)
            }
            Err(e) => {
                tracing::warn!(agent = %self.agent, "Completion failed: {}", e);
                Err(e.to_string())
            }
        }
    }
}
