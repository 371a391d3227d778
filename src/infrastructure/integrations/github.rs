//! Source host adapter (GitHub REST v3, bearer token).

use async_trait::async_trait;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::{Value, json};
use std::time::Duration;

use super::http::{self, Auth, HttpTarget};
use crate::domain::config::{ConfigError, GithubConfig, parse_base_url, resolve_secret};
use crate::domain::errors::AdapterError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::ToolSpec;

pub const TOOL: &str = "source_host";
/// GitHub caps `per_page` at 100.
const MAX_PER_PAGE: u64 = 100;
const SUMMARY_ITEMS: usize = 10;

pub struct GithubAdapter {
    target: HttpTarget,
    default_repo: Option<String>,
    max_results: u64,
}

impl GithubAdapter {
    pub fn new(config: &GithubConfig, token: SecretString) -> Result<Self, ConfigError> {
        let base = parse_base_url("integrations.source_host", &config.base_url)?;
        Ok(Self {
            target: HttpTarget::new(base, Auth::Bearer(token)),
            default_repo: config.default_repo.clone(),
            max_results: u64::from(config.max_results).clamp(1, MAX_PER_PAGE),
        })
    }

    pub fn from_config(
        config: &GithubConfig,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let token = resolve_secret("integrations.source_host", &config.token_env, lookup)?;
        Self::new(config, token)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.target = self.target.with_timeout(timeout);
        self
    }

    fn repo<'a>(&'a self, arguments: &'a Value) -> Result<&'a str, AdapterError> {
        http::optional_str(arguments, "repo")
            .or(self.default_repo.as_deref())
            .ok_or_else(|| AdapterError::invalid("missing `repo` and no default repository configured"))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.target
            .request(method, path)
            .header("User-Agent", "switchboard")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn list_prs(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let repo = self.repo(arguments)?;
        let state = http::optional_str(arguments, "state").unwrap_or("all");
        let per_page = http::optional_u64(arguments, "limit")
            .unwrap_or(self.max_results)
            .clamp(1, MAX_PER_PAGE)
            .to_string();
        let request = self.request(Method::GET, &format!("/repos/{repo}/pulls")).query(&[
            ("state", state),
            ("sort", "updated"),
            ("direction", "desc"),
            ("per_page", per_page.as_str()),
        ]);
        let body = self.target.send_json(request).await?;

        let prs: Vec<Value> = body
            .as_array()
            .map(|prs| prs.iter().map(pr_view).collect())
            .unwrap_or_default();
        let mut lines: Vec<String> = prs
            .iter()
            .take(SUMMARY_ITEMS)
            .map(|pr| {
                format!(
                    "#{} {} ({}, {})",
                    pr["number"],
                    pr["title"].as_str().unwrap_or_default(),
                    pr_status(pr),
                    pr["user"].as_str().unwrap_or("unknown"),
                )
            })
            .collect();
        if prs.len() > SUMMARY_ITEMS {
            lines.push(format!("…and {} more", prs.len() - SUMMARY_ITEMS));
        }
        let summary = if lines.is_empty() {
            format!("No pull requests in {repo}.")
        } else {
            format!("{} pull request(s) in {repo}:\n{}", prs.len(), lines.join("\n"))
        };

        Ok(json!({"repo": repo, "pull_requests": prs, "summary": summary}))
    }

    async fn get_pr(&self, arguments: &Value) -> Result<Value, AdapterError> {
        let repo = self.repo(arguments)?;
        let number = http::required_u64(arguments, "number")?;
        let request = self.request(Method::GET, &format!("/repos/{repo}/pulls/{number}"));
        let body = self.target.send_json(request).await?;

        let mut pr = pr_view(&body);
        pr["body"] = Value::String(body["body"].as_str().unwrap_or_default().to_string());
        let summary = format!(
            "{repo}#{number} {} ({})",
            pr["title"].as_str().unwrap_or_default(),
            pr_status(&pr)
        );
        Ok(json!({"pull_request": pr, "summary": summary}))
    }

    /// PR conversation comments go through the issues endpoint.
    async fn comment(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        let repo = self.repo(arguments)?;
        let number = http::required_u64(arguments, "number")?;
        let text = http::required_str(arguments, "body")?;
        if dry_run {
            return Ok(json!({"dry_run": true, "summary": format!("Would comment on {repo}#{number}")}));
        }

        let request = self
            .request(Method::POST, &format!("/repos/{repo}/issues/{number}/comments"))
            .json(&json!({"body": text}));
        let body = self.target.send_json(request).await?;
        Ok(json!({
            "url": body["html_url"],
            "summary": format!("Commented on {repo}#{number}"),
        }))
    }
}

fn pr_view(pr: &Value) -> Value {
    json!({
        "number": pr["number"],
        "title": pr["title"],
        "state": pr["state"],
        "user": pr["user"]["login"],
        "url": pr["html_url"],
        "created_at": pr["created_at"],
        "updated_at": pr["updated_at"],
        "merged_at": pr["merged_at"],
    })
}

fn pr_status(pr: &Value) -> &str {
    if pr["merged_at"].is_string() {
        "merged"
    } else {
        pr["state"].as_str().unwrap_or("unknown")
    }
}

#[async_trait]
impl IntegrationAdapter for GithubAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            TOOL,
            "GitHub: list recent pull requests of a repository, read one pull request, comment on a pull request. `repo` is `owner/name`.",
            json!({
                "type": "object",
                "required": ["action"],
                "properties": {
                    "action": {"enum": ["list_prs", "get_pr", "comment"]},
                    "repo": {"type": "string", "pattern": "^[^/\\s]+/[^/\\s]+$"},
                    "state": {"enum": ["open", "closed", "all"]},
                    "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                    "number": {"type": "integer", "minimum": 1},
                    "body": {"type": "string", "minLength": 1}
                },
                "additionalProperties": false,
                "allOf": [
                    {"if": {"properties": {"action": {"const": "get_pr"}}}, "then": {"required": ["number"]}},
                    {"if": {"properties": {"action": {"const": "comment"}}}, "then": {"required": ["number", "body"]}}
                ]
            }),
            json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "pull_requests": {"type": "array"},
                    "pull_request": {"type": "object"}
                }
            }),
        )
    }

    fn resource_key(&self, arguments: &Value) -> Option<String> {
        match arguments.get("action").and_then(Value::as_str)? {
            "get_pr" | "comment" => {
                let repo = self.repo(arguments).ok()?;
                let number = http::required_u64(arguments, "number").ok()?;
                Some(format!("{repo}#{number}"))
            }
            _ => None,
        }
    }

    fn is_write(&self, arguments: &Value) -> bool {
        arguments.get("action").and_then(Value::as_str) == Some("comment")
    }

    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        match http::action(arguments)? {
            "list_prs" => self.list_prs(arguments).await,
            "get_pr" => self.get_pr(arguments).await,
            "comment" => self.comment(arguments, dry_run).await,
            other => Err(http::unknown_action(TOOL, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::stub;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn adapter(base: &str, default_repo: Option<&str>) -> GithubAdapter {
        let config = GithubConfig {
            base_url: base.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            default_repo: default_repo.map(str::to_string),
            max_results: 50,
        };
        GithubAdapter::new(&config, SecretString::new("ghp_test".to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_list_prs_maps_fields() {
        let (base, recorder) = stub::serve_fn(|_| {
            Json(json!([
                {"number": 12, "title": "Fix login", "state": "closed", "user": {"login": "ada"},
                 "html_url": "https://github.com/acme/web/pull/12", "created_at": "2026-01-01T00:00:00Z",
                 "updated_at": "2026-01-02T00:00:00Z", "merged_at": "2026-01-02T00:00:00Z", "body": "long"},
                {"number": 13, "title": "Docs", "state": "open", "user": {"login": "bob"},
                 "html_url": "https://github.com/acme/web/pull/13", "merged_at": null}
            ]))
            .into_response()
        })
        .await;

        let out = adapter(&base, Some("acme/web"))
            .call(&json!({"action": "list_prs"}), false)
            .await
            .unwrap();

        assert_eq!(out["pull_requests"][0]["user"], "ada");
        assert!(out["pull_requests"][0].get("body").is_none());
        let summary = out["summary"].as_str().unwrap();
        assert!(summary.contains("#12 Fix login (merged, ada)"));
        assert!(summary.contains("#13 Docs (open, bob)"));

        let request = &recorder.requests()[0];
        assert_eq!(request.path, "/repos/acme/web/pulls");
        assert_eq!(
            request.query.as_deref(),
            Some("state=all&sort=updated&direction=desc&per_page=50")
        );
        assert_eq!(request.headers["authorization"], "Bearer ghp_test");
    }

    #[tokio::test]
    async fn test_comment_goes_to_issue_endpoint() {
        let (base, recorder) = stub::serve_fn(|_| {
            (StatusCode::CREATED, Json(json!({"html_url": "https://github.com/x"}))).into_response()
        })
        .await;

        let out = adapter(&base, None)
            .call(&json!({"action": "comment", "repo": "acme/api", "number": 7, "body": "LGTM"}), false)
            .await
            .unwrap();

        assert_eq!(out["summary"], "Commented on acme/api#7");
        assert_eq!(recorder.requests()[0].path, "/repos/acme/api/issues/7/comments");
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_is_retryable() {
        let (base, _) = stub::serve_fn(|_| {
            (
                StatusCode::FORBIDDEN,
                [("x-ratelimit-remaining", "0"), ("retry-after", "30")],
                "API rate limit exceeded",
            )
                .into_response()
        })
        .await;

        let err = adapter(&base, Some("acme/web"))
            .call(&json!({"action": "list_prs"}), false)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AdapterError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
    }

    #[tokio::test]
    async fn test_missing_repo_is_invalid() {
        let err = adapter("http://127.0.0.1:9", None)
            .call(&json!({"action": "list_prs"}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidArguments(_)));
    }

    #[test]
    fn test_resource_key_uses_default_repo() {
        let adapter = adapter("https://api.github.com", Some("acme/web"));
        assert_eq!(
            adapter.resource_key(&json!({"action": "comment", "number": 4, "body": "x"})),
            Some("acme/web#4".into())
        );
        assert_eq!(adapter.resource_key(&json!({"action": "list_prs"})), None);
        assert!(adapter.is_write(&json!({"action": "comment"})));
    }
}
