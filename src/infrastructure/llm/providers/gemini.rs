//! Gemini `generateContent` provider

use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::{ProviderConfig, error_from_response};
use crate::infrastructure::llm::{Context, Error, MessageRole, Response, TokenUsage};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// Execute a chat request using Gemini's API
pub async fn chat(http: &Client, config: &ProviderConfig, context: Context) -> Result<Response, Error> {
    let base_url = config
        .base_url
        .as_deref()
        .unwrap_or("https://generativelanguage.googleapis.com");
    let model = context.model.clone().unwrap_or_else(|| {
        if config.default_model.is_empty() {
            "gemini-2.0-flash".to_string()
        } else {
            config.default_model.clone()
        }
    });

    let system_instruction = context.system_text().map(|text| GeminiContent {
        role: None,
        parts: vec![GeminiPart { text }],
    });
    let contents = context
        .messages
        .into_iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| GeminiContent {
            role: Some(match m.role {
                MessageRole::Assistant => "model".to_string(),
                _ => "user".to_string(),
            }),
            parts: vec![GeminiPart { text: m.content }],
        })
        .collect();

    let generation_config = (context.temperature.is_some() || context.max_tokens.is_some()).then(|| {
        GenerationConfig {
            temperature: context.temperature,
            max_output_tokens: context.max_tokens,
        }
    });

    let request = GeminiRequest {
        contents,
        system_instruction,
        generation_config,
    };

    // Key goes in a header so it never appears in a logged URL.
    let response = http
        .post(format!("{base_url}/v1beta/models/{model}:generateContent"))
        .header("x-goog-api-key", config.api_key.expose_secret())
        .timeout(config.timeout)
        .json(&request)
        .send()
        .await
        .map_err(|e| Error::new("gemini", format!("HTTP request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(error_from_response("gemini", response).await);
    }

    let body: GeminiResponse = response
        .json()
        .await
        .map_err(|e| Error::new("gemini", format!("Failed to parse response: {e}")))?;

    let candidate = body
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| Error::new("gemini", "No candidates in response"))?;
    let content = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n");

    let usage = body.usage_metadata.map_or_else(TokenUsage::default, |u| TokenUsage {
        prompt_tokens: u.prompt_token_count,
        completion_tokens: u.candidates_token_count,
    });

    Ok(Response {
        content: content.trim().to_string(),
        model,
        usage,
    })
}
