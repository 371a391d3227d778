//! Test doubles shared by the application tests: a scripted adapter and a
//! scripted reasoning service.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::errors::AdapterError;
use crate::domain::traits::{IntegrationAdapter, LlmProvider};
use crate::domain::types::ToolSpec;

/// One scripted adapter response.
pub enum Step {
    Reply(Result<Value, AdapterError>),
    Delayed(Duration, Result<Value, AdapterError>),
    Hang,
    Panic,
}

impl Step {
    pub fn ok(payload: Value) -> Self {
        Self::Reply(Ok(payload))
    }

    pub fn err(err: AdapterError) -> Self {
        Self::Reply(Err(err))
    }

    pub fn delayed(delay: Duration, result: Result<Value, AdapterError>) -> Self {
        Self::Delayed(delay, result)
    }
}

/// Adapter that replays queued steps, then falls back to behaviour driven by
/// the arguments: `sleep_ms` delays, `hang: true` never returns, `panic_key: true`
/// panics before the call starts.
pub struct ScriptedAdapter {
    name: String,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(Value, bool)>>,
    events: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// Shares an event log with other adapters.
    pub fn with_events(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = events;
        self
    }

    /// Arguments and dry-run flag of every call, in call order.
    pub fn calls(&self) -> Vec<(Value, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn label(arguments: &Value) -> String {
        arguments
            .get("label")
            .or_else(|| arguments.get("key"))
            .and_then(Value::as_str)
            .unwrap_or("call")
            .to_string()
    }
}

pub fn object_schema() -> Value {
    json!({
        "type": "object",
        "required": ["action"],
        "properties": {
            "action": {"type": "string"},
            "key": {"type": "string"},
            "title": {"type": "string"},
            "q": {"type": "string"},
            "label": {"type": "string"},
            "sleep_ms": {"type": "integer"},
            "hang": {"type": "boolean"},
            "panic_key": {"type": "boolean"}
        }
    })
}

#[async_trait]
impl IntegrationAdapter for ScriptedAdapter {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name.clone(),
            format!("Scripted {} tool", self.name),
            object_schema(),
            json!({"type": "object"}),
        )
    }

    fn resource_key(&self, arguments: &Value) -> Option<String> {
        if arguments.get("panic_key").and_then(Value::as_bool) == Some(true) {
            panic!("resource key lookup failed");
        }
        arguments.get("key").and_then(Value::as_str).map(str::to_string)
    }

    fn is_write(&self, arguments: &Value) -> bool {
        matches!(
            arguments.get("action").and_then(Value::as_str),
            Some("create" | "comment" | "append" | "trigger")
        )
    }

    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError> {
        self.calls.lock().unwrap().push((arguments.clone(), dry_run));
        let label = Self::label(arguments);
        self.events.lock().unwrap().push(format!("start {label}"));

        let step = self.steps.lock().unwrap().pop_front();
        let result = match step {
            Some(Step::Reply(result)) => result,
            Some(Step::Delayed(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(Step::Hang) => std::future::pending().await,
            Some(Step::Panic) => panic!("scripted adapter panic"),
            None => {
                if arguments.get("hang").and_then(Value::as_bool) == Some(true) {
                    std::future::pending::<()>().await;
                }
                if let Some(ms) = arguments.get("sleep_ms").and_then(Value::as_u64) {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                Ok(json!({"summary": format!("{label} done")}))
            }
        };

        self.events.lock().unwrap().push(format!("end {label}"));
        result
    }
}

/// Reasoning service that replays queued completions and records prompts.
#[derive(Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, text: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Ok(text.into()));
        self
    }

    pub fn fail(self, error: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push_back(Err(error.into()));
        self
    }

    /// `(system, prompt)` pairs seen so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn completion(&self, system: &str, prompt: &str) -> Result<String, String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(r#"{"steps":[{"type":"respond","text":"Done."}]}"#.to_string()))
    }
}
