//! # Main Entry Point
//!
//! Loads and validates the configuration, builds the orchestration core and
//! serves the Slack Events endpoint:
//! - Domain: Configuration and Types
//! - Infrastructure: Slack, LLM, Integration adapters
//! - Application: Registry, Planner, Executor, Assembler, Engine
//! - Interface: Event gateway

mod application;
mod domain;
mod infrastructure;
mod interface;
mod strings;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::sync::Arc;

use crate::application::assembler::ResponseAssembler;
use crate::application::engine::ExecutionEngine;
use crate::application::executor::Executor;
use crate::application::logging::init_logging;
use crate::application::planner::ReasoningPlanner;
use crate::application::redaction::Redactor;
use crate::domain::config::{AppConfig, process_env, resolve_secret};
use crate::infrastructure::integrations;
use crate::infrastructure::llm::Client as LlmClient;
use crate::infrastructure::slack::{SignatureVerifier, SlackClient};
use crate::interface::http::{AppState, router};

#[derive(Parser, Debug)]
#[command(name = "switchboard", version, about = "Slack bot that routes requests to Jira, Confluence, GitHub and n8n")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "data/config.yaml")]
    config: PathBuf,

    /// Validate the configuration and credentials, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Configuration
    let config = AppConfig::load(&args.config)?;
    config.validate()?;

    // 2. Infrastructure
    let agent = config.planner_agent()?;
    let llm = LlmClient::from_agent(&config.planner.agent, agent, &process_env)?;
    let registry = integrations::build_registry(
        &config.integrations,
        config.orchestration.invocation_timeout(),
        &process_env,
    )?;
    let slack = SlackClient::from_config(&config.services.slack, &process_env)?;
    let signing_secret = resolve_secret(
        "services.slack",
        &config.services.slack.signing_secret_env,
        &process_env,
    )?;

    if args.check {
        return Ok(());
    }

    // 3. Logging
    let _guard = init_logging(&config.system.data_dir)?;
    tracing::info!(
        agent = %config.planner.agent,
        provider = llm.provider().as_str(),
        tools = registry.len(),
        "Starting switchboard"
    );

    // 4. Orchestration core
    let mut secrets = integrations::credential_values(&config.integrations, &process_env);
    secrets.push(llm.credential().expose_secret().to_string());
    secrets.push(signing_secret.expose_secret().to_string());
    secrets.extend(process_env(&config.services.slack.bot_token_env));
    let redactor = Redactor::new(secrets);

    let project_keys = config
        .integrations
        .issue_tracker
        .as_ref()
        .map(|jira| jira.project_keys.clone())
        .unwrap_or_default();
    let registry = Arc::new(registry);
    let orchestration = &config.orchestration;

    let planner = ReasoningPlanner::new(Arc::new(llm), registry.clone(), redactor.clone(), orchestration)
        .with_project_keys(project_keys);
    let engine = ExecutionEngine::new(
        planner,
        Executor::new(registry, orchestration),
        ResponseAssembler::new(orchestration, redactor),
        orchestration,
    );

    // 5. Gateway
    let state = AppState::new(
        Arc::new(engine),
        slack,
        SignatureVerifier::new(signing_secret),
        orchestration.split_long_replies,
    );
    let listener = tokio::net::TcpListener::bind(&config.services.slack.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.services.slack.bind))?;
    tracing::info!(bind = %config.services.slack.bind, "Listening for Slack events");

    axum::serve(listener, router(Arc::new(state)))
        .await
        .context("HTTP server stopped")?;
    Ok(())
}
