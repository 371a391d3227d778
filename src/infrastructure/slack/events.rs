//! Slack Events API payloads and the mapping to a `ConversationTurn`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::domain::types::ConversationTurn;

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+(\|[^>]*)?>").expect("static regex"));

/// Outer envelope of an Events API POST.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    UrlVerification {
        #[serde(default)]
        challenge: Option<String>,
    },
    EventCallback {
        event: Event,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl Event {
    /// Mentions of the bot, and direct messages from people.
    pub fn is_actionable(&self) -> bool {
        let addressed = match self.kind.as_str() {
            "app_mention" => true,
            "message" => self.channel_type.as_deref() == Some("im"),
            _ => false,
        };
        addressed && self.bot_id.is_none() && self.subtype.is_none()
    }

    /// Thread the reply belongs to: the parent thread, else the message itself.
    pub fn thread_root(&self) -> Option<&str> {
        self.thread_ts.as_deref().or(self.ts.as_deref())
    }

    pub fn conversation_id(&self) -> Option<String> {
        Some(format!("{}:{}", self.channel.as_deref()?, self.thread_root()?))
    }

    pub fn prompt(&self) -> String {
        clean_prompt(self.text.as_deref().unwrap_or_default())
    }

    pub fn to_turn(&self) -> Option<ConversationTurn> {
        let conversation_id = self.conversation_id()?;
        let timestamp = self
            .ts
            .as_deref()
            .and_then(parse_ts)
            .unwrap_or_else(Utc::now);
        Some(ConversationTurn::new(
            conversation_id,
            self.user.as_deref().unwrap_or("unknown"),
            self.prompt(),
            timestamp,
        ))
    }
}

/// Removes `<@U123>` mention tags and surrounding whitespace.
pub fn clean_prompt(text: &str) -> String {
    MENTION.replace_all(text, "").trim().to_string()
}

/// Slack `ts` values are epoch seconds with a microsecond fraction.
fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
    DateTime::from_timestamp(secs.parse().ok()?, micros * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn event(value: serde_json::Value) -> Event {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case("<@U0BOT> what's blocked in ID?", "what's blocked in ID?")]
    #[case("<@U0BOT|gidbot>   hi <@U123> ", "hi")]
    #[case("<@U0BOT>", "")]
    #[case("no mention", "no mention")]
    fn test_clean_prompt(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_prompt(raw), expected);
    }

    #[test]
    fn test_envelope_variants() {
        let verification: Envelope =
            serde_json::from_value(json!({"type": "url_verification", "challenge": "abc"})).unwrap();
        assert!(matches!(verification, Envelope::UrlVerification { challenge: Some(c) } if c == "abc"));

        let other: Envelope = serde_json::from_value(json!({"type": "app_rate_limited"})).unwrap();
        assert!(matches!(other, Envelope::Other));

        let callback: Envelope = serde_json::from_value(json!({
            "type": "event_callback",
            "event": {"type": "app_mention", "channel": "C1", "user": "U1", "text": "<@U0> hi", "ts": "1.5"}
        }))
        .unwrap();
        assert!(matches!(callback, Envelope::EventCallback { event } if event.is_actionable()));
    }

    #[test]
    fn test_actionable_events() {
        assert!(event(json!({"type": "message", "channel_type": "im", "user": "U1"})).is_actionable());
        assert!(!event(json!({"type": "message", "channel_type": "channel"})).is_actionable());
        assert!(!event(json!({"type": "app_mention", "bot_id": "B1"})).is_actionable());
        assert!(!event(json!({"type": "message", "channel_type": "im", "subtype": "message_changed"})).is_actionable());
        assert!(!event(json!({"type": "reaction_added"})).is_actionable());
    }

    #[test]
    fn test_turn_uses_thread_root() {
        let reply_in_thread = event(json!({
            "type": "app_mention", "channel": "C9", "user": "U7",
            "text": "<@U0BOT> status?", "ts": "1700000100.000300", "thread_ts": "1700000000.000100"
        }));

        let turn = reply_in_thread.to_turn().unwrap();

        assert_eq!(turn.conversation_id, "C9:1700000000.000100");
        assert_eq!(turn.sender_id, "U7");
        assert_eq!(turn.text, "status?");
        assert_eq!(turn.timestamp.timestamp(), 1_700_000_100);
        assert_eq!(turn.timestamp.timestamp_subsec_micros(), 300);
    }
}
