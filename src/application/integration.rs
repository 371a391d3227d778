//! # Integration Handle
//!
//! Wraps one `IntegrationAdapter` with the uniform invocation contract:
//! per-resource serialization, a caller-supplied timeout, latency measurement
//! and conversion of every failure (including panics) into the closed taxonomy.

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::application::locks::ResourceLocks;
use crate::domain::errors::AdapterError;
use crate::domain::traits::IntegrationAdapter;
use crate::domain::types::{InvocationOutcome, InvocationRequest, InvocationResult};

/// An adapter together with the lock table for the resources it touches.
#[derive(Clone)]
pub struct Integration {
    adapter: Arc<dyn IntegrationAdapter>,
    locks: ResourceLocks,
}

impl Integration {
    pub fn new(adapter: Arc<dyn IntegrationAdapter>) -> Self {
        Self {
            adapter,
            locks: ResourceLocks::new(),
        }
    }

    pub fn is_write(&self, arguments: &Value) -> bool {
        self.adapter.is_write(arguments)
    }

    pub fn resource_key(&self, arguments: &Value) -> Option<String> {
        self.adapter.resource_key(arguments)
    }

    pub fn locks(&self) -> &ResourceLocks {
        &self.locks
    }

    /// Runs one attempt of `request`, bounded by `timeout`.
    ///
    /// The resource lock (if any) is taken inside the timeout and released on
    /// every exit path. Never panics and never returns an unmodeled failure.
    pub async fn invoke(&self, request: &InvocationRequest, timeout: Duration) -> InvocationResult {
        let started = Instant::now();
        let key = self.adapter.resource_key(&request.arguments);

        let attempt = async {
            let _guard = match key.as_deref() {
                Some(key) => Some(self.locks.acquire(key).await),
                None => None,
            };
            self.adapter.call(&request.arguments, request.dry_run).await
        };

        let outcome = match tokio::time::timeout(timeout, AssertUnwindSafe(attempt).catch_unwind()).await
        {
            Ok(Ok(Ok(payload))) => InvocationOutcome::Success(payload),
            Ok(Ok(Err(err))) => InvocationOutcome::Failure(err),
            Ok(Err(_panic)) => {
                tracing::error!(tool = %request.tool, "Adapter panicked during invocation");
                InvocationOutcome::Failure(AdapterError::remote(None, "adapter panicked"))
            }
            Err(_elapsed) => InvocationOutcome::Failure(AdapterError::Timeout),
        };

        let latency = started.elapsed();
        match &outcome {
            InvocationOutcome::Success(_) => tracing::debug!(
                tool = %request.tool,
                attempt = request.attempt,
                latency_ms = latency.as_millis() as u64,
                "Invocation succeeded"
            ),
            InvocationOutcome::Failure(err) => tracing::debug!(
                tool = %request.tool,
                attempt = request.attempt,
                latency_ms = latency.as_millis() as u64,
                kind = err.kind(),
                error = %err,
                "Invocation failed"
            ),
        }

        InvocationResult {
            request_id: request.id,
            tool: request.tool.clone(),
            outcome,
            latency,
            attempts: request.attempt.max(1),
            dry_run: request.dry_run,
        }
    }
}
