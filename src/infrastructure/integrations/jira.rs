//! Issue tracker adapter (Jira REST v2, basic auth with email + API token).

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::time::Duration;

use super::http::{self, Auth, HttpTarget};
use crate::domain::config::{ConfigError, JiraConfig, parse_base_url, resolve_secret};
use crate::domain::errors::AdapterError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::ToolSpec;

pub const TOOL: &str = "issue_tracker";
const DEFAULT_MAX_RESULTS: u64 = 25;
/// Issues listed in a search summary line before eliding the rest.
const SUMMARY_ITEMS: usize = 10;

pub struct JiraAdapter {
    target: HttpTarget,
    project_keys: Vec<String>,
    epic_link_field: Option<String>,
    default_project: Option<String>,
}

impl JiraAdapter {
    pub fn new(config: &JiraConfig, token: SecretString) -> Result<Self, ConfigError> {
        let base = parse_base_url("integrations.issue_tracker", &config.base_url)?;
        Ok(Self {
            target: HttpTarget::new(
                base,
                Auth::Basic {
                    user: config.email.clone(),
                    token,
                },
            ),
            project_keys: config.project_keys.clone(),
            epic_link_field: config.epic_link_field.clone(),
            default_project: config
                .default_project
                .clone()
                .or_else(|| match config.project_keys.as_slice() {
                    [only] => Some(only.clone()),
                    _ => None,
                })
                .map(|key| key.to_uppercase()),
        })
    }

    pub fn from_config(
        config: &JiraConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = resolve_secret("integrations.issue_tracker", &config.api_token_env, lookup)?;
        Self::new(config, token)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.target = self.target.with_timeout(timeout);
        self
    }

    /// Project for `create`: the requested one, else the configured default.
    fn project_for(&self, arguments: &Value) -> Option<String> {
        http::optional_str(arguments, "project")
            .map(str::to_uppercase)
            .or_else(|| self.default_project.clone())
    }

    fn fields(&self) -> String {
        let mut fields = "summary,status,assignee,updated,parent,issuetype,description".to_string();
        if let Some(epic) = &self.epic_link_field {
            fields.push(',');
            fields.push_str(epic);
        }
        fields
    }

    /// Flattens one issue into what the planner and the reply need.
    fn issue_view(&self, issue: &Value) -> Value {
        let key = issue["key"].as_str().unwrap_or_default();
        let fields = &issue["fields"];
        let parent = if fields["parent"].is_object() {
            json!({
                "key": fields["parent"]["key"],
                "summary": fields["parent"]["fields"]["summary"],
                "status": fields["parent"]["fields"]["status"]["name"],
            })
        } else {
            self.epic_link_field
                .as_ref()
                .and_then(|field| fields[field.as_str()].as_str())
                .map_or(Value::Null, |epic| json!({"key": epic, "issuetype": "Epic"}))
        };

        json!({
            "key": key,
            "summary": fields["summary"],
            "status": fields["status"]["name"],
            "issuetype": fields["issuetype"]["name"],
            "assignee": fields["assignee"]["displayName"].as_str().unwrap_or("unassigned"),
            "url": format!("{}/browse/{key}", self.target.base()),
            "updated": fields["updated"],
            "parent": parent,
        })
    }

    async fn search(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let jql = http::required_str(arguments, "jql")?;
        let max_results = http::optional_u64(arguments, "max_results")
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .to_string();
        let fields = self.fields();
        let request = self
            .target
            .request(Method::GET, "/rest/api/2/search")
            .query(&[("jql", jql), ("maxResults", max_results.as_str()), ("fields", fields.as_str())]);
        let body = self.target.send_json(request).await?;

        let issues: Vec<Value> = body["issues"]
            .as_array()
            .map(|issues| issues.iter().map(|i| self.issue_view(i)).collect())
            .unwrap_or_default();
        let total = body["total"].as_u64().unwrap_or(issues.len() as u64);

        let mut lines: Vec<String> = issues
            .iter()
            .take(SUMMARY_ITEMS)
            .map(|i| {
                format!(
                    "{} {} ({}, {})",
                    i["key"].as_str().unwrap_or_default(),
                    i["summary"].as_str().unwrap_or_default(),
                    i["status"].as_str().unwrap_or("unknown"),
                    i["assignee"].as_str().unwrap_or("unassigned"),
                )
            })
            .collect();
        if issues.len() > SUMMARY_ITEMS {
            lines.push(format!("…and {} more", issues.len() - SUMMARY_ITEMS));
        }
        let summary = if lines.is_empty() {
            "No matching issues.".to_string()
        } else {
            format!("Found {total} issue(s):\n{}", lines.join("\n"))
        };

        Ok(json!({"total": total, "issues": issues, "summary": summary}))
    }

    async fn get(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let key = http::required_str(arguments, "key")?;
        let fields = self.fields();
        let request = self
            .target
            .request(Method::GET, &format!("/rest/api/2/issue/{key}"))
            .query(&[("fields", fields.as_str())]);
        let body = self.target.send_json(request).await?;

        let mut view = self.issue_view(&body);
        view["description"] = body["fields"]["description"].clone();
        view["summary_line"] = Value::String(format!(
            "{key}: {} [{}], {}",
            view["summary"].as_str().unwrap_or_default(),
            view["status"].as_str().unwrap_or("unknown"),
            view["assignee"].as_str().unwrap_or("unassigned"),
        ));
        Ok(json!({
            "issue": view,
            "summary": view["summary_line"],
        }))
    }

    async fn create(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        let project = self.project_for(arguments).ok_or_else(|| {
            AdapterError::invalid(format!(
                "project is required, choose one of: {}",
                self.project_keys.join(", ")
            ))
        })?;
        let title = http::required_str(arguments, "title")?;
        let issue_type = http::optional_str(arguments, "issue_type").unwrap_or("Task");
        let description = http::optional_str(arguments, "description").unwrap_or_default();

        if !self.project_keys.is_empty() && !self.project_keys.iter().any(|k| k.eq_ignore_ascii_case(&project)) {
            return Err(AdapterError::invalid(format!("unknown project {project}")));
        }
        if dry_run {
            return Ok(json!({
                "dry_run": true,
                "summary": format!("Would create a {issue_type} in {project}: {title}"),
            }));
        }

        let request = self.target.request(Method::POST, "/rest/api/2/issue").json(&json!({
            "fields": {
                "project": {"key": project},
                "summary": title,
                "description": description,
                "issuetype": {"name": issue_type},
            }
        }));
        let body = self.target.send_json(request).await?;
        let key = body["key"]
            .as_str()
            .ok_or_else(|| AdapterError::remote(None, "create response carried no issue key"))?;

        Ok(json!({
            "key": key,
            "url": format!("{}/browse/{key}", self.target.base()),
            "summary": format!("Created {key}: {title}"),
        }))
    }

    async fn comment(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        let key = http::required_str(arguments, "key")?;
        let text = http::required_str(arguments, "body")?;
        if dry_run {
            return Ok(json!({"dry_run": true, "summary": format!("Would comment on {key}")}));
        }

        let request = self
            .target
            .request(Method::POST, &format!("/rest/api/2/issue/{key}/comment"))
            .json(&json!({"body": text}));
        let body = self.target.send_json(request).await?;
        Ok(json!({
            "key": key,
            "comment_id": body["id"],
            "summary": format!("Commented on {key}"),
        }))
    }
}

#[async_trait]
impl IntegrationAdapter for JiraAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL,
            "Jira issue tracker: search issues with JQL, read one issue, create an issue, comment on an issue.",
            json!({
                "type": "object",
                "required": ["action"],
                "properties": {
                    "action": {"enum": ["search", "get", "create", "comment"]},
                    "jql": {"type": "string"},
                    "max_results": {"type": "integer", "minimum": 1, "maximum": 100},
                    "key": {"type": "string", "pattern": "^[A-Za-z][A-Za-z0-9_]*-[0-9]+$"},
                    "project": {"type": "string"},
                    "title": {"type": "string", "minLength": 1},
                    "description": {"type": "string"},
                    "issue_type": {"type": "string"},
                    "body": {"type": "string", "minLength": 1}
                },
                "additionalProperties": false,
                "allOf": [
                    {"if": {"properties": {"action": {"const": "search"}}}, "then": {"required": ["jql"]}},
                    {"if": {"properties": {"action": {"const": "get"}}}, "then": {"required": ["key"]}},
                    {"if": {"properties": {"action": {"const": "create"}}}, "then": {"required": ["title"]}},
                    {"if": {"properties": {"action": {"const": "comment"}}}, "then": {"required": ["key", "body"]}}
                ]
            }),
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "issues": {"type": "array"},
                    "issue": {"type": "object"},
                    "key": {"type": "string"}
                }
            }),
        )
    }

    fn resource_key(&self, arguments: &Value) -> Option<String> {
        match arguments.get("action").and_then(Value::as_str)? {
            "get" | "comment" => http::optional_str(arguments, "key").map(str::to_uppercase),
            "create" => self
                .project_for(arguments)
                .map(|project| format!("project:{project}")),
            _ => None,
        }
    }

    fn is_write(&self, arguments: &Value) -> bool {
        matches!(
            arguments.get("action").and_then(Value::as_str),
            Some("create" | "comment")
        )
    }

    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        match http::action(arguments)? {
            "search" => self.search(arguments).await,
            "get" => self.get(arguments).await,
            "create" => self.create(arguments, dry_run).await,
            "comment" => self.comment(arguments, dry_run).await,
            other => Err(http::unknown_action(TOOL, other)),
        }
    }
}
