//! Workflow automation adapter (n8n public API plus webhook triggers).

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::time::Duration;

use super::http::{self, Auth, HttpTarget};
use crate::domain::config::{ConfigError, N8nConfig, parse_base_url, resolve_secret};
use crate::domain::errors::AdapterError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::ToolSpec;

pub const TOOL: &str = "workflow";
const API_KEY_HEADER: &str = "X-N8N-API-KEY";

pub struct N8nAdapter {
    target: HttpTarget,
}

impl N8nAdapter {
    pub fn new(config: &N8nConfig, api_key: SecretString) -> Result<Self, ConfigError> {
        let base = parse_base_url("integrations.workflow", &config.base_url)?;
        Ok(Self {
            target: HttpTarget::new(
                base,
                Auth::Header {
                    name: API_KEY_HEADER,
                    value: api_key,
                },
            ),
        })
    }

    pub fn from_config(
        config: &N8nConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = resolve_secret("integrations.workflow", &config.api_key_env, lookup)?;
        Self::new(config, api_key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.target = self.target.with_timeout(timeout);
        self
    }

    async fn list_workflows(&self) -> Result<Value, AdapterError> {
        let request = self.target.request(Method::GET, "/api/v1/workflows");
        let body = self.target.send_json(request).await?;

        let workflows: Vec<Value> = body["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|w| json!({"id": w["id"], "name": w["name"], "active": w["active"]}))
                    .collect()
            })
            .unwrap_or_default();
        let active = workflows.iter().filter(|w| w["active"] == true).count();
        let names: Vec<&str> = workflows.iter().filter_map(|w| w["name"].as_str()).collect();
        let summary = if names.is_empty() {
            "No workflows defined.".to_string()
        } else {
            format!("{} workflow(s), {active} active: {}", names.len(), names.join(", "))
        };
        Ok(json!({"workflows": workflows, "summary": summary}))
    }

    async fn execution(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let id = http::required_u64(arguments, "id")?;
        let request = self.target.request(Method::GET, &format!("/api/v1/executions/{id}"));
        let body = self.target.send_json(request).await?;

        let status = body["status"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| if body["finished"] == true { "success" } else { "running" }.to_string());
        Ok(json!({
            "id": id,
            "workflow_id": body["workflowId"],
            "status": status,
            "started_at": body["startedAt"],
            "stopped_at": body["stoppedAt"],
            "summary": format!("Execution {id} is {status}"),
        }))
    }

    async fn trigger(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        let workflow = http::required_str(arguments, "workflow")?;
        let payload = arguments.get("payload").cloned().unwrap_or_else(|| json!({}));
        if dry_run {
            return Ok(json!({"dry_run": true, "summary": format!("Would trigger workflow {workflow}")}));
        }

        let request = self
            .target
            .request(Method::POST, &format!("/webhook/{workflow}"))
            .json(&payload);
        let response = self.target.send_json(request).await?;
        Ok(json!({
            "workflow": workflow,
            "response": response,
            "summary": format!("Triggered workflow {workflow}"),
        }))
    }
}

#[async_trait]
impl IntegrationAdapter for N8nAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL,
            "n8n workflow automation: list workflows, check one execution, trigger a workflow webhook with an optional JSON payload.",
            json!({
                "type": "object",
                "required": ["action"],
                "properties": {
                    "action": {"enum": ["list_workflows", "execution", "trigger"]},
                    "id": {"type": ["integer", "string"]},
                    "workflow": {"type": "string", "pattern": "^[A-Za-z0-9_-]+$"},
                    "payload": {"type": "object"}
                },
                "additionalProperties": false,
                "allOf": [
                    {"if": {"properties": {"action": {"const": "execution"}}}, "then": {"required": ["id"]}},
                    {"if": {"properties": {"action": {"const": "trigger"}}}, "then": {"required": ["workflow"]}}
                ]
            }),
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "workflows": {"type": "array"},
                    "status": {"type": "string"}
                }
            }),
        )
    }

    fn resource_key(&self, arguments: &Value) -> Option<String> {
        match arguments.get("action").and_then(Value::as_str)? {
            "trigger" => http::optional_str(arguments, "workflow").map(str::to_string),
            _ => None,
        }
    }

    fn is_write(&self, arguments: &Value) -> bool {
        arguments.get("action").and_then(Value::as_str) == Some("trigger")
    }

    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        match http::action(arguments)? {
            "list_workflows" => self.list_workflows().await,
            "execution" => self.execution(arguments).await,
            "trigger" => self.trigger(arguments, dry_run).await,
            other => Err(http::unknown_action(TOOL, other)),
        }
    }
}
