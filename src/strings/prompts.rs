//! Prompt templates for the reasoning service.

/// A builder for rendering prompts with context.
pub struct PromptRenderer<'a> {
    template: &'a str,
    replacements: Vec<(&'a str, String)>,
}

impl<'a> PromptRenderer<'a> {
    pub fn new(template: &'a str) -> Self {
        Self {
            template,
            replacements: Vec::new(),
        }
    }

    pub fn set(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.replacements.push((key, value.into()));
        self
    }

    pub fn render(self) -> String {
        let mut result = self.template.to_string();
        for (key, value) in self.replacements {
            result = result.replace(key, &value);
        }

        if let Some(start) = result.find("{{")
            && let Some(end) = result[start..].find("}}")
        {
            let placeholder = &result[start..start + end + 2];
            tracing::error!("[PROMPT RENDER ERROR] Unreplaced placeholder found in output: {}", placeholder);
        }

        result
    }
}

pub const PLANNER_TEMPLATE: &str = include_str!("../../prompts/planner.md");

pub const PLANNER_SYSTEM: &str = "You plan tool calls for a team assistant. \
Answer with one JSON object of the form {\"steps\": [...]} and nothing else.";

/// Everything the planner prompt shows for one iteration.
pub struct PlannerContext<'a> {
    pub tools: &'a str,
    pub project_keys: &'a [String],
    pub date: &'a str,
    pub sender: &'a str,
    pub message: &'a str,
    pub results: &'a str,
    pub iteration: u32,
    pub max_calls: usize,
}

pub fn planner_prompt(ctx: &PlannerContext<'_>) -> String {
    let project_keys = if ctx.project_keys.is_empty() {
        "(none configured)".to_string()
    } else {
        ctx.project_keys.join(", ")
    };
    let results = if ctx.results.trim().is_empty() {
        "(none yet)"
    } else {
        ctx.results
    };

    PromptRenderer::new(PLANNER_TEMPLATE)
        .set("{{TOOLS}}", ctx.tools)
        .set("{{PROJECT_KEYS}}", project_keys)
        .set("{{DATE}}", ctx.date)
        .set("{{SENDER}}", ctx.sender)
        .set("{{MESSAGE}}", ctx.message)
        .set("{{RESULTS}}", results)
        .set("{{ITERATION}}", ctx.iteration.to_string())
        .set("{{MAX_CALLS}}", ctx.max_calls.to_string())
        .render()
}

/// Appended to the prompt when the previous answer failed validation.
pub fn correction_prompt(previous_prompt: &str, reason: &str) -> String {
    format!(
        "{previous_prompt}\n\n## Your previous answer was rejected\n{reason}\n\
         Answer again with a corrected JSON object."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_prompt_fills_every_placeholder() {
        let keys = vec!["ID".to_string(), "WL".to_string()];
        let prompt = planner_prompt(&PlannerContext {
            tools: "- wiki: search docs",
            project_keys: &keys,
            date: "2026-01-05",
            sender: "U123",
            message: "what's blocking ID?",
            results: "",
            iteration: 1,
            max_calls: 8,
        });

        assert!(!prompt.contains("{{"));
        assert!(prompt.contains("- wiki: search docs"));
        assert!(prompt.contains("ID, WL"));
        assert!(prompt.contains("(none yet)"));
        assert!(prompt.contains("at most 8"));
    }

    #[test]
    fn test_correction_prompt_appends_reason() {
        let prompt = correction_prompt("base", "unknown tool: crm");
        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("unknown tool: crm"));
    }
}
