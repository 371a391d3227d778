//! # Domain Types
//!
//! Data carried through one turn: the inbound conversation turn, tool
//! declarations, invocation requests and results, plans and the final reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::AdapterError;

/// Identifier of one inbound conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier attributing an `InvocationResult` back to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One inbound message, immutable once created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub turn_id: TurnId,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            turn_id: TurnId::new(),
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp,
        }
    }
}

/// Declared capability of one registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        output_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema,
        }
    }
}

/// A single planned call against a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub id: InvocationId,
    pub tool: String,
    pub arguments: Value,
    pub turn_id: TurnId,
    /// Attempts made so far; the executor bumps this before every retry.
    pub attempt: u32,
    /// Set on retries of writes whose outcome is unknown.
    pub dry_run: bool,
}

impl InvocationRequest {
    pub fn new(tool: impl Into<String>, arguments: Value, turn_id: TurnId) -> Self {
        Self {
            id: InvocationId::new(),
            tool: tool.into(),
            arguments,
            turn_id,
            attempt: 0,
            dry_run: false,
        }
    }
}

/// What an invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    Success(Value),
    Failure(AdapterError),
}

/// Result of one invocation, attributed to its request by `request_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub request_id: InvocationId,
    pub tool: String,
    pub outcome: InvocationOutcome,
    pub latency: Duration,
    pub attempts: u32,
    pub dry_run: bool,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            InvocationOutcome::Success(value) => Some(value),
            InvocationOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&AdapterError> {
        match &self.outcome {
            InvocationOutcome::Success(_) => None,
            InvocationOutcome::Failure(err) => Some(err),
        }
    }

    /// Result for a request that never finished within the turn budget.
    /// `attempts` counts the attempts that started; it is reported as at
    /// least one.
    pub fn unfinished(request: &InvocationRequest, attempts: u32, latency: Duration) -> Self {
        Self {
            request_id: request.id,
            tool: request.tool.clone(),
            outcome: InvocationOutcome::Failure(AdapterError::Timeout),
            latency,
            attempts: attempts.max(1),
            dry_run: request.dry_run,
        }
    }
}

/// Validated output of one planner iteration. Never mutated; a revised
/// plan is a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub turn_id: TurnId,
    pub iteration: u32,
    pub invocations: Vec<InvocationRequest>,
    pub draft_reply: Option<String>,
}

impl Plan {
    /// A plan with no invocations ends the plan/execute loop.
    pub fn is_final(&self) -> bool {
        self.invocations.is_empty()
    }
}

/// The single reply delivered for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub truncated: bool,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}
