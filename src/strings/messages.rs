//! # Messages
//!
//! Constant strings and format functions for everything the bot posts to
//! the chat surface. Failure notices never include raw error details.

pub const THINKING: &str = ":hourglass_flowing_sand: Thinking...";
pub const EMPTY_PROMPT: &str =
    "It looks like you didn't ask me anything. Please try again with a question!";

// Fatal-to-turn
pub const GENERIC_FAILURE: &str =
    "⚠️ Sorry, something went wrong while handling your request. Please try again.";
pub const TURN_TIMEOUT: &str = "⚠️ Sorry, I'm taking too long to think. Try again in a bit.";
pub const NOTHING_TO_SAY: &str = "I couldn't find anything to report.";

pub const TRUNCATION_MARKER: &str = "… _(reply truncated)_";

pub fn auth_failed(tool: &str) -> String {
    format!("🚫 I couldn't sign in to {}. An admin should check its credentials.", tool_label(tool))
}

pub fn rate_limited(tool: &str) -> String {
    format!("⏳ {} is rate limiting me right now. Please try again shortly.", tool_label(tool))
}

pub fn remote_failed(tool: &str) -> String {
    format!("❌ {} returned an error.", tool_label(tool))
}

pub fn timed_out(tool: &str) -> String {
    format!("⌛ {} did not answer in time.", tool_label(tool))
}

pub fn invalid_request(tool: &str) -> String {
    format!("❓ I couldn't build a valid request for {}.", tool_label(tool))
}

pub fn write_unconfirmed(tool: &str) -> String {
    format!(
        "⚠️ I couldn't confirm whether the change in {} went through. Please check before retrying.",
        tool_label(tool)
    )
}

pub fn result_summary(tool: &str, summary: &str) -> String {
    format!("✅ *{}*: {summary}", tool_label(tool))
}

/// Human name for a registered tool.
pub fn tool_label(tool: &str) -> &str {
    match tool {
        "issue_tracker" => "the issue tracker",
        "wiki" => "the wiki",
        "source_host" => "the source host",
        "workflow" => "the workflow platform",
        other => other,
    }
}
