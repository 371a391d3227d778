//! LLM API wrapper for the reasoning service
//!
//! One `Client` per configured agent. Providers speak either the
//! OpenAI-compatible chat API (OpenAI, Groq, xAI), Anthropic's messages API
//! or Gemini's `generateContent`.

mod client;
pub mod providers;
mod types;

pub use client::Client;

pub use types::{Context, Error, Message, MessageRole, Provider, Response, TokenUsage};
