//! # Parsing Utils
//!
//! Extracts the planner's JSON answer from raw model output and decodes it
//! into untyped steps. Nothing here checks tools or schemas; that is the
//! planner's validation pass.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(\{.*?\})\s*```").expect("static regex")
});

/// One step as the model wrote it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawStep {
    Invoke {
        tool: String,
        #[serde(default)]
        arguments: Value,
    },
    Respond {
        text: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
}

/// Finds the JSON object in a response: a fenced block wins, otherwise the
/// span from the first `{` to the last `}`.
pub fn extract_json(response: &str) -> Option<&str> {
    if let Some(caps) = FENCED_JSON.captures(response)
        && let Some(body) = caps.get(1)
    {
        return Some(body.as_str());
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

pub fn parse_steps(response: &str) -> Result<Vec<RawStep>, String> {
    let json = extract_json(response).ok_or_else(|| "no JSON object found in the answer".to_string())?;
    let plan: RawPlan =
        serde_json::from_str(json).map_err(|e| format!("answer is not a valid plan object: {e}"))?;
    Ok(plan.steps)
}
