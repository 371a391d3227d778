//! # Dispatch Executor
//!
//! Runs the invocations of one plan concurrently, bounded by the fan-out
//! limit, with per-invocation retries and a shared turn deadline.
//!
//! Admission is FIFO in plan order. A failure never aborts its siblings.
//! When the deadline passes, every task still running is aborted (which
//! drops its resource guard) and reported as `Timeout`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::task::{Id, JoinSet};
use tokio::time::{Instant, sleep, sleep_until};

use crate::application::integration::Integration;
use crate::application::registry::ToolRegistry;
use crate::application::retry::RetryPolicy;
use crate::domain::config::OrchestrationConfig;
use crate::domain::errors::AdapterError;
use crate::domain::types::{InvocationOutcome, InvocationRequest, InvocationResult, Plan};

pub struct Executor {
    registry: Arc<ToolRegistry>,
    policy: RetryPolicy,
    fan_out: usize,
    invocation_timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, config: &OrchestrationConfig) -> Self {
        Self {
            registry,
            policy: RetryPolicy::from_config(&config.retry),
            fan_out: config.fan_out.max(1),
            invocation_timeout: config.invocation_timeout(),
        }
    }

    /// Executes every invocation of `plan`, returning one result per
    /// invocation in plan order.
    pub async fn execute(&self, plan: &Plan, deadline: Instant) -> Vec<InvocationResult> {
        let started = Instant::now();
        let mut slots: Vec<Option<InvocationResult>> = vec![None; plan.invocations.len()];
        let attempts: Vec<Arc<AtomicU32>> = plan
            .invocations
            .iter()
            .map(|_| Arc::new(AtomicU32::new(0)))
            .collect();
        let mut tasks: HashMap<Id, usize> = HashMap::new();
        let mut queue = plan.invocations.iter().enumerate();
        let mut running = JoinSet::new();

        let budget = sleep_until(deadline);
        tokio::pin!(budget);

        loop {
            while running.len() < self.fan_out {
                let Some((index, request)) = queue.next() else {
                    break;
                };
                match self.registry.integration(&request.tool) {
                    Ok(integration) => {
                        let integration = integration.clone();
                        let request = request.clone();
                        let policy = self.policy;
                        let timeout = self.invocation_timeout;
                        let counter = attempts[index].clone();
                        let handle = running.spawn(async move {
                            let result = run_with_retry(
                                &integration,
                                request,
                                policy,
                                timeout,
                                deadline,
                                &counter,
                            )
                            .await;
                            (index, result)
                        });
                        tasks.insert(handle.id(), index);
                    }
                    Err(err) => {
                        slots[index] = Some(rejected(request, err.to_string()));
                    }
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next() => match joined {
                    Some(Ok((index, result))) => slots[index] = Some(result),
                    Some(Err(err)) => {
                        tracing::error!("Invocation task failed: {}", err);
                        if let Some(&index) = tasks.get(&err.id()) {
                            let request = &plan.invocations[index];
                            slots[index] = Some(InvocationResult {
                                request_id: request.id,
                                tool: request.tool.clone(),
                                outcome: InvocationOutcome::Failure(AdapterError::remote(
                                    None,
                                    "invocation task failed",
                                )),
                                latency: started.elapsed(),
                                attempts: attempts[index].load(Ordering::Relaxed).max(1),
                                dry_run: request.dry_run,
                            });
                        }
                    }
                    None => break,
                },
                _ = &mut budget => {
                    tracing::warn!(
                        in_flight = running.len(),
                        "Turn budget exhausted, cancelling outstanding invocations"
                    );
                    running.abort_all();
                    while running.join_next().await.is_some() {}
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        plan.invocations
            .iter()
            .zip(slots)
            .zip(&attempts)
            .map(|((request, slot), attempts)| {
                slot.unwrap_or_else(|| {
                    InvocationResult::unfinished(request, attempts.load(Ordering::Relaxed), elapsed)
                })
            })
            .collect()
    }
}

/// Retries one invocation per `policy` without outliving `deadline`.
async fn run_with_retry(
    integration: &Integration,
    mut request: InvocationRequest,
    policy: RetryPolicy,
    invocation_timeout: Duration,
    deadline: Instant,
    attempts: &AtomicU32,
) -> InvocationResult {
    let started = Instant::now();
    loop {
        request.attempt += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return InvocationResult::unfinished(&request, request.attempt - 1, started.elapsed());
        }
        attempts.store(request.attempt, Ordering::Relaxed);

        let mut result = integration
            .invoke(&request, invocation_timeout.min(remaining))
            .await;
        result.latency = started.elapsed();

        let Some(error) = result.error() else {
            return result;
        };
        let Some(delay) = policy.next_delay(request.attempt, error) else {
            return result;
        };
        if Instant::now() + delay >= deadline {
            tracing::debug!(tool = %request.tool, "Retry would overrun the turn budget");
            return result;
        }

        // The first attempt of a write may have landed; only preview from now on.
        if matches!(error, AdapterError::Timeout) && integration.is_write(&request.arguments) {
            request.dry_run = true;
        }
        tracing::info!(
            tool = %request.tool,
            attempt = request.attempt,
            delay_ms = delay.as_millis() as u64,
            kind = error.kind(),
            "Retrying invocation"
        );
        sleep(delay).await;
    }
}

fn rejected(request: &InvocationRequest, reason: String) -> InvocationResult {
    InvocationResult {
        request_id: request.id,
        tool: request.tool.clone(),
        outcome: InvocationOutcome::Failure(AdapterError::InvalidArguments(reason)),
        latency: Duration::ZERO,
        attempts: 0,
        dry_run: request.dry_run,
    }
}
