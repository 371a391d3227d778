//! # Interface Layer
//!
//! Entry points from the outside world: the Slack Events HTTP endpoint.

pub mod http;
