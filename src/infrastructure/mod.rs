//! # Infrastructure Layer
//!
//! Handles interactions with external systems and services.
//! Implements the traits defined in the Domain layer (`ChatProvider`,
//! `LlmProvider`, `IntegrationAdapter`).

pub mod integrations;
pub mod llm;
pub mod slack;

#[cfg(test)]
pub mod stub;
