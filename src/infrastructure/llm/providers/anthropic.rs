//! Anthropic messages API provider

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response, TokenUsage};

const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<AnthropicResponseContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Execute a chat request using Anthropic's API
pub async fn chat(http: &Client, config: &ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or("https://api.anthropic.com");
    let model = context.model.clone().unwrap_or_else(|| {
        if config.default_model.is_empty() {
            "claude-3-5-sonnet-20241022".to_string()
        } else {
            config.default_model.clone()
        }
    });

    // System prompts travel in their own field.
    let system = context.system_text();
    let messages = context
        .messages
        .into_iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| AnthropicMessage {
            role: m.role.as_str().to_string(),
            content: m.content,
        })
        .collect();

    let request = AnthropicRequest {
        model: model.clone(),
        max_tokens: context.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system,
        temperature: context.temperature,
    };

    let response = http
        .post(format!("{base_url}/v1/messages"))
        .header("x-api-key", config.api_key.expose_secret())
        .header("anthropic-version", API_VERSION)
        .timeout(config.timeout)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::new("anthropic", format!("HTTP request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(error_from_response("anthropic", response).await);
    }

    let body: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| Error::new("anthropic", format!("Failed to parse response: {e}")))?;

    let content = body
        .content
        .iter()
        .filter(|block| block.content_type == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    if content.is_empty() {
        return Err(Error::new("anthropic", "No text content in response"));
    }

    Ok(Response {
        content,
        model: body.model,
        usage: TokenUsage {
            prompt_tokens: body.usage.input_tokens,
            completion_tokens: body.usage.output_tokens,
        },
    })
}
