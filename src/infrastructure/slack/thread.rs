//! # Slack Thread
//!
//! Implements `ChatProvider` for one Slack thread, so the gateway can post
//! and edit replies without knowing about channels and timestamps.

use anyhow::Result;
use async_trait::async_trait;

use super::client::SlackClient;
use crate::domain::traits::ChatProvider;

#[derive(Clone)]
pub struct SlackThread {
    client: SlackClient,
    channel: String,
    thread_ts: String,
}

impl SlackThread {
    pub fn new(client: SlackClient, channel: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
            thread_ts: thread_ts.into(),
        }
    }
}

#[async_trait]
impl ChatProvider for SlackThread {
    async fn send_message(&self, content: &str) -> Result<String> {
        tracing::debug!(conversation_id = %self.conversation_id(), "Posting message");
        self.client
            .post_message(&self.channel, &self.thread_ts, content)
            .await
    }

    async fn edit_message(&self, message_id: &str, content: &str) -> Result<()> {
        self.client
            .update_message(&self.channel, message_id, content)
            .await
    }

    fn conversation_id(&self) -> String {
        format!("{}:{}", self.channel, self.thread_ts)
    }
}
