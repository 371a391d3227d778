//! OpenAI-compatible API provider
//!
//! Supports OpenAI, Groq, xAI and any endpoint speaking `/chat/completions`.

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response};
use crate::infrastructure::llm::{Context, Error, Response, TokenUsage};

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Execute a chat request using an OpenAI-compatible API
pub async fn chat(
    http: &Client,
    config: &ProviderConfig,
    default_base: &str,
    context: Context,
) -> Result<Response, Error> {
    let base_url = config.base_url.as_deref().unwrap_or(default_base);
    let model = context.model.clone().unwrap_or_else(|| {
        if config.default_model.is_empty() {
            "gpt-4o".to_string()
        } else {
            config.default_model.clone()
        }
    });

    let request = OpenAIRequest {
        model: model.clone(),
        messages: context
            .messages
            .into_iter()
            .map(|msg| OpenAIMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content,
            })
            .collect(),
        temperature: context.temperature,
        max_tokens: context.max_tokens,
    };

    let response = http
        .post(format!("{base_url}/chat/completions"))
        .bearer_auth(config.api_key.expose_secret())
        .timeout(config.timeout)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::new("openai", format!("HTTP request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(error_from_response("openai", response).await);
    }

    let body: OpenAIResponse = response
        .json()
        .await
        .map_err(|e| Error::new("openai", format!("Failed to parse response: {e}")))?;

    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| Error::new("openai", "No choices in response"))?;
    let usage = body.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
    });

    Ok(Response {
        content,
        model: if body.model.is_empty() { model } else { body.model },
        usage,
    })
}
