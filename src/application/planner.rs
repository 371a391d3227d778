//! # Reasoning Planner
//!
//! Turns a conversation turn plus the results gathered so far into a `Plan`.
//! The model's answer is untrusted: it is decoded into `RawStep`s and every
//! invocation is checked against the registry before a `Plan` is built. A
//! rejected answer gets exactly one corrective re-prompt.

use serde_json::Value;
use std::sync::Arc;

use crate::application::parsing::{RawStep, parse_steps};
use crate::application::redaction::Redactor;
use crate::application::registry::ToolRegistry;
use crate::domain::config::OrchestrationConfig;
use crate::domain::errors::PlanError;
use crate::domain::traits::LlmProvider;
use crate::domain::types::{ConversationTurn, InvocationRequest, InvocationResult, Plan};
use crate::strings::prompts::{self, PlannerContext};

/// Longest rendering of one prior result fed back into the prompt.
const MAX_RESULT_CHARS: usize = 2000;

pub struct ReasoningPlanner {
    llm: Arc<dyn LlmProvider>,
    registry: Arc<ToolRegistry>,
    redactor: Redactor,
    project_keys: Vec<String>,
    max_calls: usize,
}

impl ReasoningPlanner {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        registry: Arc<ToolRegistry>,
        redactor: Redactor,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            llm,
            registry,
            redactor,
            project_keys: Vec::new(),
            max_calls: config.max_calls_per_plan,
        }
    }

    pub fn with_project_keys(mut self, keys: Vec<String>) -> Self {
        self.project_keys = keys;
        self
    }

    pub async fn plan(
        &self,
        turn: &ConversationTurn,
        prior: &[InvocationResult],
        iteration: u32,
    ) -> Result<Plan, PlanError> {
        let prompt = self.build_prompt(turn, prior, iteration);
        let response = self
            .llm
            .completion(prompts::PLANNER_SYSTEM, &prompt)
            .await
            .map_err(PlanError::Provider)?;

        let reason = match self.validate(turn, iteration, &response) {
            Ok(plan) => return Ok(plan),
            Err(reason) => reason,
        };
        tracing::warn!(iteration, %reason, "Planner answer rejected, re-prompting once");

        let response = self
            .llm
            .completion(
                prompts::PLANNER_SYSTEM,
                &prompts::correction_prompt(&prompt, &reason),
            )
            .await
            .map_err(PlanError::Provider)?;
        self.validate(turn, iteration, &response)
            .map_err(PlanError::InvalidPlan)
    }

    fn build_prompt(&self, turn: &ConversationTurn, prior: &[InvocationResult], iteration: u32) -> String {
        let tools = self.tools_section();
        let results = self.results_section(prior);
        let date = turn.timestamp.format("%Y-%m-%d %H:%M UTC").to_string();
        prompts::planner_prompt(&PlannerContext {
            tools: &tools,
            project_keys: &self.project_keys,
            date: &date,
            sender: &turn.sender_id,
            message: &turn.text,
            results: &results,
            iteration,
            max_calls: self.max_calls,
        })
    }

    fn tools_section(&self) -> String {
        self.registry
            .list()
            .iter()
            .map(|spec| {
                format!(
                    "- `{}`: {}\n  input schema: {}",
                    spec.name, spec.description, spec.input_schema
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn results_section(&self, prior: &[InvocationResult]) -> String {
        prior
            .iter()
            .map(|result| match result.payload() {
                Some(payload) => {
                    let rendered = self.redactor.redact_value(payload).to_string();
                    let rendered: String = rendered.chars().take(MAX_RESULT_CHARS).collect();
                    let note = if result.dry_run { " (dry run only, not applied)" } else { "" };
                    format!("- `{}` succeeded{note}: {rendered}", result.tool)
                }
                None => {
                    let kind = result.error().map_or("unknown", |e| e.kind());
                    format!("- `{}` failed ({kind}) after {} attempt(s)", result.tool, result.attempts)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Checks a raw answer and builds the plan, or explains what is wrong.
    fn validate(&self, turn: &ConversationTurn, iteration: u32, response: &str) -> Result<Plan, String> {
        let steps = parse_steps(response)?;
        if steps.is_empty() {
            return Err("the plan has no steps".to_string());
        }

        let mut invocations: Vec<InvocationRequest> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for step in steps {
            match step {
                RawStep::Respond { text } => {
                    let text = text.trim();
                    if !text.is_empty() {
                        texts.push(text.to_string());
                    }
                }
                RawStep::Invoke { tool, arguments } => {
                    self.registry.lookup(&tool).map_err(|e| e.to_string())?;
                    if !matches!(arguments, Value::Object(_)) {
                        return Err(format!("arguments for {tool} must be a JSON object"));
                    }
                    self.registry.validate_arguments(&tool, &arguments)?;
                    if invocations
                        .iter()
                        .any(|other| other.tool == tool && other.arguments == arguments)
                    {
                        return Err(format!("duplicate call to {tool} with identical arguments"));
                    }
                    invocations.push(InvocationRequest::new(tool, arguments, turn.turn_id));
                }
            }
        }

        if invocations.len() > self.max_calls {
            return Err(format!(
                "the plan makes {} calls, at most {} are allowed",
                invocations.len(),
                self.max_calls
            ));
        }
        if invocations.is_empty() && texts.is_empty() {
            return Err("the plan neither calls a tool nor answers".to_string());
        }

        Ok(Plan {
            turn_id: turn.turn_id,
            iteration,
            invocations,
            draft_reply: (!texts.is_empty()).then(|| texts.join("\n\n")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{ScriptedAdapter, ScriptedLlm};
    use crate::domain::errors::AdapterError;
    use crate::domain::types::InvocationOutcome;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ScriptedAdapter::new("issue_tracker"))).unwrap();
        registry.register(Arc::new(ScriptedAdapter::new("wiki"))).unwrap();
        Arc::new(registry)
    }

    fn planner(llm: Arc<ScriptedLlm>) -> ReasoningPlanner {
        ReasoningPlanner::new(
            llm,
            registry(),
            Redactor::new(vec!["sekret-token".to_string()]),
            &OrchestrationConfig::default(),
        )
        .with_project_keys(vec!["ID".into(), "WL".into()])
    }

    fn turn(text: &str) -> ConversationTurn {
        ConversationTurn::new("C1:171.1", "U1", text, Utc::now())
    }

    #[tokio::test]
    async fn test_valid_plan_is_built() {
        let llm = Arc::new(ScriptedLlm::new().respond(
            r#"```json
{"steps":[{"type":"invoke","tool":"issue_tracker","arguments":{"action":"create","title":"Bug X"}},
          {"type":"respond","text":"Creating the ticket."}]}
```"#,
        ));
        let turn = turn("file Bug X");

        let plan = planner(llm.clone()).plan(&turn, &[], 1).await.unwrap();

        assert_eq!(plan.turn_id, turn.turn_id);
        assert_eq!(plan.invocations.len(), 1);
        assert_eq!(plan.invocations[0].tool, "issue_tracker");
        assert_eq!(plan.invocations[0].turn_id, turn.turn_id);
        assert_eq!(plan.draft_reply.as_deref(), Some("Creating the ticket."));
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_tool_triggers_one_reprompt() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(r#"{"steps":[{"type":"invoke","tool":"crm","arguments":{"action":"get"}}]}"#)
                .respond(r#"{"steps":[{"type":"respond","text":"I have no CRM access."}]}"#),
        );

        let plan = planner(llm.clone()).plan(&turn("check crm"), &[], 1).await.unwrap();

        assert!(plan.is_final());
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].1.contains("unknown tool: crm"));
    }

    #[tokio::test]
    async fn test_second_invalid_answer_is_fatal() {
        let bad = r#"{"steps":[{"type":"invoke","tool":"crm","arguments":{}}]}"#;
        let llm = Arc::new(ScriptedLlm::new().respond(bad).respond(bad));

        let err = planner(llm).plan(&turn("check crm"), &[], 1).await.unwrap_err();

        assert_eq!(err, PlanError::InvalidPlan("unknown tool: crm".into()));
    }

    #[tokio::test]
    async fn test_schema_violation_is_rejected() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .respond(r#"{"steps":[{"type":"invoke","tool":"wiki","arguments":{"q":"onboarding"}}]}"#)
                .respond(r#"{"steps":[{"type":"invoke","tool":"wiki","arguments":"onboarding"}]}"#),
        );

        let err = planner(llm).plan(&turn("docs?"), &[], 1).await.unwrap_err();

        assert!(matches!(err, PlanError::InvalidPlan(reason) if reason.contains("JSON object")));
    }

    #[tokio::test]
    async fn test_duplicates_and_call_cap_are_rejected() {
        let planner = planner(Arc::new(ScriptedLlm::new()));
        let turn = turn("x");

        let duplicate = r#"{"steps":[
            {"type":"invoke","tool":"wiki","arguments":{"action":"search","q":"a"}},
            {"type":"invoke","tool":"wiki","arguments":{"action":"search","q":"a"}}]}"#;
        assert!(planner.validate(&turn, 1, duplicate).unwrap_err().contains("duplicate"));

        let steps: Vec<String> = (0..9)
            .map(|i| format!(r#"{{"type":"invoke","tool":"wiki","arguments":{{"action":"search","q":"{i}"}}}}"#))
            .collect();
        let too_many = format!(r#"{{"steps":[{}]}}"#, steps.join(","));
        assert!(planner.validate(&turn, 1, &too_many).unwrap_err().contains("at most 8"));
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported() {
        let llm = Arc::new(ScriptedLlm::new().fail("connection refused"));

        let err = planner(llm).plan(&turn("hi"), &[], 1).await.unwrap_err();

        assert_eq!(err, PlanError::Provider("connection refused".into()));
    }

    #[tokio::test]
    async fn test_prior_results_are_redacted_in_prompt() {
        let llm = Arc::new(ScriptedLlm::new());
        let prior = vec![
            InvocationResult {
                request_id: crate::domain::types::InvocationId::new(),
                tool: "wiki".into(),
                outcome: InvocationOutcome::Success(json!({
                    "title": "Onboarding",
                    "api_token": "abc",
                    "body": "use sekret-token here"
                })),
                latency: Duration::from_millis(10),
                attempts: 1,
                dry_run: false,
            },
            InvocationResult {
                request_id: crate::domain::types::InvocationId::new(),
                tool: "issue_tracker".into(),
                outcome: InvocationOutcome::Failure(AdapterError::auth("401 from https://jira")),
                latency: Duration::from_millis(10),
                attempts: 1,
                dry_run: false,
            },
        ];

        planner(llm.clone()).plan(&turn("onboarding?"), &prior, 2).await.unwrap();

        let (_, prompt) = &llm.prompts()[0];
        assert!(prompt.contains("Onboarding"));
        assert!(!prompt.contains("sekret-token"));
        assert!(!prompt.contains("\"abc\""));
        assert!(prompt.contains("`issue_tracker` failed (auth)"));
        assert!(!prompt.contains("https://jira"));
        assert!(prompt.contains("ID, WL"));
    }
}
