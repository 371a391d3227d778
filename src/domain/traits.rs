//! # Domain Traits
//!
//! Abstract interfaces for the pluggable edges of the system (chat surface,
//! reasoning service, external integrations).
//! Concrete implementations live in the Infrastructure layer.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::AdapterError;
use crate::domain::types::ToolSpec;

/// Abstract interface for a chat thread (e.g. a Slack thread)
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Post a message to the thread, returning its message id
    async fn send_message(&self, content: &str) -> Result<String>;

    /// Replace the content of a previously posted message
    async fn edit_message(&self, message_id: &str, content: &str) -> Result<()>;

    /// Identifier of the conversation this provider posts into
    fn conversation_id(&self) -> String;
}

/// Abstract interface for the reasoning service
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for a system prompt and a user prompt
    async fn completion(&self, system: &str, prompt: &str) -> Result<String, String>;
}

/// Uniform wrapper around one external API.
///
/// Implementations only translate requests and failures; locking, timeouts
/// and latency measurement are applied by the caller.
#[async_trait]
pub trait IntegrationAdapter: Send + Sync {
    /// The tool this adapter exposes to the planner
    fn spec(&self) -> ToolSpec;

    /// Remote resource touched by a call, used to serialize conflicting calls
    fn resource_key(&self, arguments: &Value) -> Option<String>;

    /// Whether a call changes remote state
    fn is_write(&self, arguments: &Value) -> bool;

    /// Perform one call. Writes with `dry_run` set must not change remote state.
    async fn call(&self, arguments: &Value, dry_run: bool) -> Result<Value, AdapterError>;
}
