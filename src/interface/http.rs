//! # Event Gateway
//!
//! Slack Events API endpoint. Verifies and acknowledges events right away,
//! then runs the turn in the background through the conversation scheduler
//! and posts the reply into the originating thread.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::assembler::split_message;
use crate::application::engine::ExecutionEngine;
use crate::application::scheduler::ConversationScheduler;
use crate::domain::traits::ChatProvider;
use crate::domain::types::ConversationTurn;
use crate::infrastructure::slack::events::Envelope;
use crate::infrastructure::slack::{SignatureVerifier, SlackClient, SlackThread};
use crate::strings::messages;

pub struct AppState {
    engine: Arc<ExecutionEngine>,
    scheduler: ConversationScheduler,
    slack: SlackClient,
    verifier: SignatureVerifier,
    /// Chunk size when long replies are split instead of truncated.
    split_at: Option<usize>,
}

impl AppState {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        slack: SlackClient,
        verifier: SignatureVerifier,
        split_long_replies: bool,
    ) -> Self {
        let split_at = split_long_replies.then(|| engine.assembler().max_chars());
        Self {
            engine,
            scheduler: ConversationScheduler::new(),
            slack,
            verifier,
            split_at,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(challenge).post(events))
        .route("/slack/events", get(challenge).post(events))
        .with_state(state)
}

fn status(code: StatusCode, body: Value) -> Response {
    (code, Json(body)).into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn ok() -> Response {
    status(StatusCode::OK, json!({"status": "ok"}))
}

async fn challenge(Query(params): Query<HashMap<String, String>>) -> Response {
    match params.get("challenge") {
        Some(challenge) => status(StatusCode::OK, json!({"challenge": challenge})),
        None => status(StatusCode::BAD_REQUEST, json!({"error": "missing challenge"})),
    }
}

async fn events(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return status(StatusCode::BAD_REQUEST, json!({"error": "invalid JSON"}));
    };
    let envelope = serde_json::from_value::<Envelope>(payload).unwrap_or(Envelope::Other);

    // Slack sends the handshake before a signing secret can be relied on.
    if let Envelope::UrlVerification { challenge } = &envelope {
        return match challenge {
            Some(challenge) => status(StatusCode::OK, json!({"challenge": challenge})),
            None => status(StatusCode::BAD_REQUEST, json!({"error": "missing challenge"})),
        };
    }

    if let Err(e) = state.verifier.verify(
        header(&headers, "x-slack-request-timestamp"),
        header(&headers, "x-slack-signature"),
        &body,
    ) {
        tracing::warn!(error = %e, "Rejected unsigned Slack request");
        return status(StatusCode::FORBIDDEN, json!({"error": "invalid signature"}));
    }

    if let Some(retry) = header(&headers, "x-slack-retry-num") {
        tracing::debug!(retry, "Ignoring Slack retry");
        return ok();
    }

    let Envelope::EventCallback { event } = envelope else {
        return ok();
    };
    if !event.is_actionable() {
        return ok();
    }
    let (Some(channel), Some(thread_ts), Some(turn)) =
        (event.channel.clone(), event.thread_root().map(str::to_string), event.to_turn())
    else {
        tracing::debug!(kind = %event.kind, "Event without channel or ts");
        return ok();
    };

    tracing::info!(
        conversation_id = %turn.conversation_id,
        sender = %turn.sender_id,
        "Accepted event"
    );
    let thread = SlackThread::new(state.slack.clone(), channel, thread_ts);
    let worker = state.clone();
    let conversation_id = turn.conversation_id.clone();
    state.scheduler.submit(&conversation_id, async move {
        deliver(&worker, &thread, turn).await;
    });
    ok()
}

/// Runs one turn and posts its reply, replacing the placeholder when possible.
async fn deliver(state: &AppState, chat: &dyn ChatProvider, turn: ConversationTurn) {
    if turn.text.is_empty() {
        if let Err(e) = chat.send_message(messages::EMPTY_PROMPT).await {
            tracing::error!(error = %e, "Failed to post empty-prompt notice");
        }
        return;
    }

    let placeholder = match chat.send_message(messages::THINKING).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to post placeholder");
            None
        }
    };

    let reply = state.engine.handle_turn(&turn).await;
    let chunks = match state.split_at {
        Some(max) => split_message(&reply.text, max),
        None => vec![reply.text],
    };

    let mut chunks = chunks.into_iter();
    let Some(first) = chunks.next() else {
        return;
    };
    let edited = match &placeholder {
        Some(id) => match chat.edit_message(id, &first).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to edit placeholder, posting instead");
                false
            }
        },
        None => false,
    };
    if !edited && let Err(e) = chat.send_message(&first).await {
        tracing::error!(error = %e, "Failed to post reply");
        return;
    }
    for chunk in chunks {
        if let Err(e) = chat.send_message(&chunk).await {
            tracing::error!(error = %e, "Failed to post reply chunk");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::assembler::ResponseAssembler;
    use crate::application::executor::Executor;
    use crate::application::planner::ReasoningPlanner;
    use crate::application::redaction::Redactor;
    use crate::application::registry::ToolRegistry;
    use crate::application::testing::ScriptedLlm;
    use crate::domain::config::OrchestrationConfig;
    use crate::infrastructure::slack::signature::sign;
    use crate::infrastructure::stub::{self, Recorder};
    use anyhow::bail;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::Mutex;
    use std::time::Duration;

    const SECRET: &str = "signing-secret";

    fn engine(llm: ScriptedLlm, config: &OrchestrationConfig) -> Arc<ExecutionEngine> {
        let registry = Arc::new(ToolRegistry::new());
        Arc::new(ExecutionEngine::new(
            ReasoningPlanner::new(Arc::new(llm), registry.clone(), Redactor::default(), config),
            Executor::new(registry, config),
            ResponseAssembler::new(config, Redactor::default()),
            config,
        ))
    }

    fn respond(text: &str) -> String {
        json!({"steps": [{"type": "respond", "text": text}]}).to_string()
    }

    async fn gateway(llm: ScriptedLlm) -> (String, Recorder) {
        let (slack_base, slack) = stub::serve_fn(|_| {
            Json(json!({"ok": true, "ts": "1700000001.000100"})).into_response()
        })
        .await;
        let config = OrchestrationConfig::default();
        let state = AppState::new(
            engine(llm, &config),
            SlackClient::new(&slack_base, SecretString::new("xoxb-t".to_string())).unwrap(),
            SignatureVerifier::new(SecretString::new(SECRET.to_string())),
            false,
        );
        (stub::serve(router(Arc::new(state))).await, slack)
    }

    async fn post_signed(base: &str, body: &Value, extra: &[(&str, &str)]) -> reqwest::Response {
        let body = body.to_string();
        let ts = chrono::Utc::now().timestamp();
        let mut request = reqwest::Client::new()
            .post(format!("{base}/slack/events"))
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", ts.to_string())
            .header("x-slack-signature", sign(SECRET, ts, &body));
        for (name, value) in extra {
            request = request.header(*name, *value);
        }
        request.body(body).send().await.unwrap()
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.requests().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn mention(text: &str) -> Value {
        json!({
            "type": "event_callback",
            "event": {"type": "app_mention", "channel": "C1", "user": "U1", "text": text, "ts": "1700000000.000100"}
        })
    }

    #[tokio::test]
    async fn test_url_verification_handshake() {
        let (base, _) = gateway(ScriptedLlm::new()).await;
        let client = reqwest::Client::new();

        let echoed: Value = client
            .post(&base)
            .json(&json!({"type": "url_verification", "challenge": "3eZbrw1a"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(echoed, json!({"challenge": "3eZbrw1a"}));

        let missing = client
            .post(&base)
            .json(&json!({"type": "url_verification"}))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 400);

        let get = client.get(format!("{base}/?challenge=abc")).send().await.unwrap();
        assert_eq!(get.json::<Value>().await.unwrap(), json!({"challenge": "abc"}));
        let get = client.get(format!("{base}/slack/events")).send().await.unwrap();
        assert_eq!(get.status(), 400);
    }

    #[tokio::test]
    async fn test_bad_requests_are_rejected() {
        let (base, slack) = gateway(ScriptedLlm::new()).await;
        let client = reqwest::Client::new();

        let not_json = client.post(&base).body("hello").send().await.unwrap();
        assert_eq!(not_json.status(), 400);

        let unsigned = client.post(&base).json(&mention("<@U0> hi")).send().await.unwrap();
        assert_eq!(unsigned.status(), 403);
        assert!(slack.requests().is_empty());
    }

    #[tokio::test]
    async fn test_mention_gets_placeholder_then_edit() {
        let (base, slack) = gateway(ScriptedLlm::new().respond(respond("Three issues are blocked."))).await;

        let ack = post_signed(&base, &mention("<@U0BOT> what's blocked?"), &[]).await;
        assert_eq!(ack.json::<Value>().await.unwrap(), json!({"status": "ok"}));
        wait_for(&slack, 2).await;

        let requests = slack.requests();
        assert_eq!(requests.len(), 2);
        let placeholder: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(requests[0].path, "/chat.postMessage");
        assert_eq!(placeholder["text"], messages::THINKING);
        assert_eq!(placeholder["thread_ts"], "1700000000.000100");
        let edit: Value = serde_json::from_str(&requests[1].body).unwrap();
        assert_eq!(requests[1].path, "/chat.update");
        assert_eq!(edit["ts"], "1700000001.000100");
        assert_eq!(edit["text"], "Three issues are blocked.");
    }

    #[tokio::test]
    async fn test_retries_and_bot_messages_are_ignored() {
        let (base, slack) = gateway(ScriptedLlm::new()).await;

        let retry = post_signed(&base, &mention("<@U0> hi"), &[("x-slack-retry-num", "1")]).await;
        assert_eq!(retry.status(), 200);

        let from_bot = json!({
            "type": "event_callback",
            "event": {"type": "app_mention", "channel": "C1", "bot_id": "B1", "text": "hi", "ts": "1.1"}
        });
        let ack = post_signed(&base, &from_bot, &[]).await;
        assert_eq!(ack.status(), 200);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(slack.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_gets_notice_without_planning() {
        let (base, slack) = gateway(ScriptedLlm::new().fail("must not be called")).await;

        post_signed(&base, &mention("<@U0BOT>  "), &[]).await;
        wait_for(&slack, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let requests = slack.requests();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(body["text"], messages::EMPTY_PROMPT);
    }

    #[derive(Default)]
    struct FakeChat {
        posted: Mutex<Vec<String>>,
        edited: Mutex<Vec<String>>,
        fail_edit: bool,
    }

    #[async_trait]
    impl ChatProvider for FakeChat {
        async fn send_message(&self, content: &str) -> anyhow::Result<String> {
            let mut posted = self.posted.lock().unwrap();
            posted.push(content.to_string());
            Ok(format!("m{}", posted.len()))
        }

        async fn edit_message(&self, _message_id: &str, content: &str) -> anyhow::Result<()> {
            if self.fail_edit {
                bail!("cant_update_message");
            }
            self.edited.lock().unwrap().push(content.to_string());
            Ok(())
        }

        fn conversation_id(&self) -> String {
            "C1:1.0".to_string()
        }
    }

    fn state(llm: ScriptedLlm, config: &OrchestrationConfig) -> AppState {
        AppState::new(
            engine(llm, config),
            SlackClient::new("https://slack.invalid/api", SecretString::new("x".to_string())).unwrap(),
            SignatureVerifier::new(SecretString::new(SECRET.to_string())),
            config.split_long_replies,
        )
    }

    #[tokio::test]
    async fn test_failed_edit_falls_back_to_post() {
        let state = state(ScriptedLlm::new().respond(respond("All green.")), &OrchestrationConfig::default());
        let chat = FakeChat {
            fail_edit: true,
            ..FakeChat::default()
        };
        let turn = ConversationTurn::new("C1:1.0", "U1", "status?", chrono::Utc::now());

        deliver(&state, &chat, turn).await;

        assert_eq!(*chat.posted.lock().unwrap(), vec![messages::THINKING, "All green."]);
    }

    #[tokio::test]
    async fn test_long_reply_is_split_into_chunks() {
        let config = OrchestrationConfig {
            max_reply_chars: 64,
            split_long_replies: true,
            ..OrchestrationConfig::default()
        };
        let long = (1..=12).map(|i| format!("line number {i:02}")).collect::<Vec<_>>().join("\n");
        let state = state(ScriptedLlm::new().respond(respond(&long)), &config);
        let chat = FakeChat::default();
        let turn = ConversationTurn::new("C1:1.0", "U1", "list", chrono::Utc::now());

        deliver(&state, &chat, turn).await;

        let edited = chat.edited.lock().unwrap();
        let posted = chat.posted.lock().unwrap();
        assert_eq!(edited.len(), 1);
        assert!(posted.len() > 2);
        let mut all = vec![edited[0].clone()];
        all.extend(posted[1..].iter().cloned());
        assert!(all.iter().all(|chunk| chunk.chars().count() <= 64));
        assert_eq!(all.join("\n"), long);
    }
}
