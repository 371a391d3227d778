//! # Error Taxonomy
//!
//! Closed error sets for the orchestration core. Adapter failures travel as
//! data inside `InvocationResult`; registry and planning failures are
//! returned to the caller.

use std::time::Duration;
use thiserror::Error;

/// Every failure an integration adapter may report.
///
/// The `detail` strings are for logs only and are never shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("authentication rejected: {detail}")]
    Auth { detail: String },

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("remote error (status {status:?}): {detail}")]
    Remote { status: Option<u16>, detail: String },

    #[error("timed out")]
    Timeout,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl AdapterError {
    pub fn auth(detail: impl Into<String>) -> Self {
        Self::Auth {
            detail: detail.into(),
        }
    }

    pub fn remote(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Remote {
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::InvalidArguments(detail.into())
    }

    /// Only rate limiting and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout)
    }

    /// Short stable label used in logs and metrics fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::RateLimited { .. } => "rate_limited",
            Self::Remote { .. } => "remote",
            Self::Timeout => "timeout",
            Self::InvalidArguments(_) => "invalid_arguments",
        }
    }
}

/// Errors raised while building or querying the tool registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} declares an invalid input schema: {reason}")]
    InvalidSchema { tool: String, reason: String },
}

/// Errors raised by the reasoning planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The planner output failed validation twice in a row.
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// The reasoning service could not be reached or answered with an error.
    #[error("reasoning service failed: {0}")]
    Provider(String),
}
