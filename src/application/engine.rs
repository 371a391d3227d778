//! # Execution Engine
//!
//! Drives one turn through the bounded plan → execute → re-plan loop and
//! always produces exactly one `Reply`. Results accumulate across
//! iterations and are handed back to the planner by value.

use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

use crate::application::assembler::ResponseAssembler;
use crate::application::executor::Executor;
use crate::application::planner::ReasoningPlanner;
use crate::domain::config::OrchestrationConfig;
use crate::domain::errors::PlanError;
use crate::domain::types::{ConversationTurn, InvocationResult, Reply};
use crate::strings::messages;

pub struct ExecutionEngine {
    planner: ReasoningPlanner,
    executor: Executor,
    assembler: ResponseAssembler,
    max_iterations: u32,
    turn_budget: Duration,
}

impl ExecutionEngine {
    pub fn new(
        planner: ReasoningPlanner,
        executor: Executor,
        assembler: ResponseAssembler,
        config: &OrchestrationConfig,
    ) -> Self {
        Self {
            planner,
            executor,
            assembler,
            max_iterations: config.max_iterations.max(1),
            turn_budget: config.turn_budget(),
        }
    }

    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    pub async fn handle_turn(&self, turn: &ConversationTurn) -> Reply {
        let span = tracing::info_span!(
            "turn",
            turn_id = %turn.turn_id,
            conversation_id = %turn.conversation_id
        );
        self.run_turn(turn).instrument(span).await
    }

    async fn run_turn(&self, turn: &ConversationTurn) -> Reply {
        let started = Instant::now();
        let deadline = started + self.turn_budget;
        let mut gathered: Vec<InvocationResult> = Vec::new();
        let mut draft: Option<String> = None;

        for iteration in 1..=self.max_iterations {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(iteration, "Turn budget exhausted before planning");
                break;
            }

            let planned =
                tokio::time::timeout(remaining, self.planner.plan(turn, &gathered, iteration)).await;
            let plan = match planned {
                Ok(Ok(plan)) => plan,
                Ok(Err(PlanError::InvalidPlan(reason))) => {
                    tracing::error!(iteration, %reason, "Planner produced no valid plan");
                    return Reply::new(messages::GENERIC_FAILURE);
                }
                Ok(Err(PlanError::Provider(reason))) => {
                    tracing::error!(iteration, %reason, "Reasoning service failed");
                    if gathered.is_empty() {
                        return Reply::new(messages::GENERIC_FAILURE);
                    }
                    break;
                }
                Err(_) => {
                    tracing::warn!(iteration, "Planner did not answer within the turn budget");
                    break;
                }
            };

            if plan.draft_reply.is_some() {
                draft = plan.draft_reply.clone();
            }
            if plan.is_final() {
                tracing::info!(
                    iteration,
                    invocations = gathered.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Turn complete"
                );
                return self.finish(draft.as_deref(), &gathered, false);
            }

            tracing::info!(iteration, invocations = plan.invocations.len(), "Executing plan");
            let results = self.executor.execute(&plan, deadline).await;
            gathered.extend(results);
        }

        let budget_spent = Instant::now() >= deadline;
        if !budget_spent {
            tracing::info!(max = self.max_iterations, "Iteration cap reached, forcing a reply");
        }
        self.finish(draft.as_deref(), &gathered, budget_spent)
    }

    fn finish(&self, draft: Option<&str>, gathered: &[InvocationResult], budget_spent: bool) -> Reply {
        if budget_spent && !gathered.iter().any(InvocationResult::success) {
            return Reply::new(messages::TURN_TIMEOUT);
        }
        self.assembler.assemble(draft.unwrap_or_default(), gathered)
    }
}
