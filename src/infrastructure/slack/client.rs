//! Minimal Slack Web API client: post and update messages.

use anyhow::{Context, Result, bail};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use std::time::Duration;

use crate::domain::config::{ConfigError, SlackConfig, parse_base_url, resolve_secret};

const TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    token: SecretString,
}

impl SlackClient {
    pub fn new(api_base: &str, token: SecretString) -> Result<Self, ConfigError> {
        let base = parse_base_url("services.slack", api_base)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: base.as_str().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_config(
        config: &SlackConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = resolve_secret("services.slack", &config.bot_token_env, lookup)?;
        Self::new(&config.api_base, token)
    }

    /// Posts into a thread and returns the new message's `ts`.
    pub async fn post_message(&self, channel: &str, thread_ts: &str, text: &str) -> Result<String> {
        let body = self
            .call(
                "chat.postMessage",
                json!({"channel": channel, "thread_ts": thread_ts, "text": text}),
            )
            .await?;
        body["ts"]
            .as_str()
            .map(str::to_string)
            .context("chat.postMessage returned no ts")
    }

    pub async fn update_message(&self, channel: &str, ts: &str, text: &str) -> Result<()> {
        self.call("chat.update", json!({"channel": channel, "ts": ts, "text": text}))
            .await
            .map(|_| ())
    }

    /// Slack answers 200 with `ok: false` for most failures.
    async fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(self.token.expose_secret())
            .timeout(TIMEOUT)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("{method} returned an undecodable body ({status})"))?;
        if body["ok"] != true {
            bail!(
                "{method} failed: {}",
                body["error"].as_str().unwrap_or("unknown error")
            );
        }
        Ok(body)
    }
}
