//! # Application Layer
//!
//! Contains the orchestration core of the bot: the tool registry, the
//! reasoning planner, the concurrent executor, the response assembler and
//! the engine and scheduler that drive them per conversation turn.

pub mod assembler;
pub mod engine;
pub mod executor;
pub mod integration;
pub mod locks;
pub mod logging;
pub mod parsing;
pub mod planner;
pub mod redaction;
pub mod registry;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
pub mod testing;
