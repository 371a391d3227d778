//! # Strings Module
//!
//! Centralizes user-facing strings and prompt templates.

pub mod messages;
pub mod prompts;
