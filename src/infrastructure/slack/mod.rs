//! # Slack
//!
//! Web API client, per-thread `ChatProvider`, Events API payloads and
//! request signature verification.

pub mod client;
pub mod events;
pub mod signature;
pub mod thread;

pub use client::SlackClient;
pub use signature::SignatureVerifier;
pub use thread::SlackThread;
