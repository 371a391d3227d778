//! Wiki adapter (Confluence Cloud content API).

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::time::Duration;

use super::http::{self, Auth, HttpTarget};
use crate::domain::config::{ConfigError, ConfluenceConfig, parse_base_url, resolve_secret};
use crate::domain::errors::AdapterError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::ToolSpec;

pub const TOOL: &str = "wiki";
const DEFAULT_LIMIT: u64 = 10;
/// Characters of page body handed back by `get`.
const MAX_BODY_CHARS: usize = 4000;

pub struct ConfluenceAdapter {
    target: HttpTarget,
}

impl ConfluenceAdapter {
    pub fn new(config: &ConfluenceConfig, token: SecretString) -> Result<Self, ConfigError> {
        let base = parse_base_url("integrations.wiki", &config.base_url)?;
        Ok(Self {
            target: HttpTarget::new(
                base,
                Auth::Basic {
                    user: config.email.clone(),
                    token,
                },
            ),
        })
    }

    pub fn from_config(
        config: &ConfluenceConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = resolve_secret("integrations.wiki", &config.api_token_env, lookup)?;
        Self::new(config, token)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.target = self.target.with_timeout(timeout);
        self
    }

    fn page_url(&self, page: &Value) -> Value {
        match page["_links"]["webui"].as_str() {
            Some(path) => Value::String(format!("{}/wiki{path}", self.target.base())),
            None => Value::Null,
        }
    }

    async fn search(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let q = http::required_str(arguments, "q")?;
        let limit = http::optional_u64(arguments, "limit")
            .unwrap_or(DEFAULT_LIMIT)
            .to_string();
        let cql = format!("text ~ \"{}\"", cql_escape(q));
        let request = self
            .target
            .request(Method::GET, "/wiki/rest/api/content/search")
            .query(&[("cql", cql.as_str()), ("limit", limit.as_str())]);
        let body = self.target.send_json(request).await?;

        let pages: Vec<Value> = body["results"]
            .as_array()
            .map(|results| {
                results
                    .iter()
                    .map(|page| {
                        json!({
                            "page_id": page["id"],
                            "title": page["title"],
                            "url": self.page_url(page),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let summary = if pages.is_empty() {
            format!("No wiki pages mention \"{q}\".")
        } else {
            let titles: Vec<&str> = pages.iter().filter_map(|p| p["title"].as_str()).collect();
            format!("Found {} wiki page(s): {}", pages.len(), titles.join(", "))
        };
        Ok(json!({"pages": pages, "summary": summary}))
    }

    async fn fetch_page(&self, page_id: &str) -> Result<Value, AdapterError> {
        let request = self
            .target
            .request(Method::GET, &format!("/wiki/rest/api/content/{page_id}"))
            .query(&[("expand", "body.storage,version")]);
        self.target.send_json(request).await
    }

    async fn get(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let page_id = http::required_str(arguments, "page_id")?;
        let page = self.fetch_page(page_id).await?;

        let body: String = page["body"]["storage"]["value"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .take(MAX_BODY_CHARS)
            .collect();
        let title = page["title"].as_str().unwrap_or_default();
        Ok(json!({
            "page_id": page_id,
            "title": title,
            "version": page["version"]["number"],
            "url": self.page_url(&page),
            "body": body,
            "summary": format!("Read wiki page \"{title}\""),
        }))
    }

    /// Appends storage-format content; Confluence requires the next version number.
    async fn append(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        let page_id = http::required_str(arguments, "page_id")?;
        let text = http::required_str(arguments, "text")?;
        if dry_run {
            return Ok(json!({"dry_run": true, "summary": format!("Would append to page {page_id}")}));
        }

        let page = self.fetch_page(page_id).await?;
        let version = page["version"]["number"]
            .as_u64()
            .ok_or_else(|| AdapterError::remote(None, format!("page {page_id} carried no version")))?;
        let title = page["title"].as_str().unwrap_or_default();
        let existing = page["body"]["storage"]["value"].as_str().unwrap_or_default();

        let request = self
            .target
            .request(Method::PUT, &format!("/wiki/rest/api/content/{page_id}"))
            .json(&json!({
                "id": page_id,
                "type": "page",
                "title": title,
                "version": {"number": version + 1},
                "body": {"storage": {
                    "value": format!("{existing}<p>{}</p>", escape_html(text)),
                    "representation": "storage",
                }},
            }));
        self.target.send_json(request).await?;

        Ok(json!({
            "page_id": page_id,
            "version": version + 1,
            "summary": format!("Appended to \"{title}\""),
        }))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl IntegrationAdapter for ConfluenceAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL,
            "Confluence wiki: full-text search pages, read a page, append a paragraph to a page.",
            json!({
                "type": "object",
                "required": ["action"],
                "properties": {
                    "action": {"enum": ["search", "get", "append"]},
                    "q": {"type": "string", "minLength": 1},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 50},
                    "page_id": {"type": "string", "pattern": "^[0-9]+$"},
                    "text": {"type": "string", "minLength": 1}
                },
                "additionalProperties": false,
                "allOf": [
                    {"if": {"properties": {"action": {"const": "search"}}}, "then": {"required": ["q"]}},
                    {"if": {"properties": {"action": {"const": "get"}}}, "then": {"required": ["page_id"]}},
                    {"if": {"properties": {"action": {"const": "append"}}}, "then": {"required": ["page_id", "text"]}}
                ]
            }),
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "pages": {"type": "array"},
                    "body": {"type": "string"}
                }
            }),
        )
    }

    fn resource_key(&self, arguments: &Value) -> Option<String> {
        match arguments.get("action").and_then(Value::as_str)? {
            "get" | "append" => http::optional_str(arguments, "page_id").map(str::to_string),
            _ => None,
        }
    }

    fn is_write(&self, arguments: &Value) -> bool {
        arguments.get("action").and_then(Value::as_str) == Some("append")
    }

    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        match http::action(arguments)? {
            "search" => self.search(arguments).await,
            "get" => self.get(arguments).await,
            "append" => self.append(arguments, dry_run).await,
            other => Err(http::unknown_action(TOOL, other)),
        }
    }
}

/// Escapes a phrase for a quoted CQL string. Backslashes go first.
fn cql_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
