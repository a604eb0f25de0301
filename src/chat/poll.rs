//! HTTP-polling chat adapter (YouTube and Kick pseudo-chat APIs).
//!
//! On a fixed interval, issues an authenticated GET with an
//! `after=<last message id>` cursor once one is known. A non-success
//! status or network error costs one backoff cycle (a longer sleep)
//! before the next attempt; a successful batch updates the cursor to the
//! last item's id and emits items in source order.

use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::Value;
use url::Url;

use crate::chat::manager::AdapterContext;
use crate::chat::message::{ChatMessage, Platform, normalize_timestamp};
use crate::error::{ParseError, SourceError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Outcome of one poll attempt, for delay policy purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    /// Endpoint answered with a non-success status.
    HttpFailure,
    /// Request did not complete (connection refused, timeout, ...).
    NetworkError,
}

/// Delay before the next poll attempt. Failures of either kind earn one
/// backoff cycle; success returns to the normal cadence.
pub fn next_delay(outcome: PollOutcome, poll_interval: Duration) -> Duration {
    match outcome {
        PollOutcome::Success => poll_interval,
        PollOutcome::HttpFailure | PollOutcome::NetworkError => poll_interval * 2,
    }
}

/// Platform-specific request headers, mirroring what the chat endpoints
/// expect from a browser client.
pub fn platform_headers(platform: &Platform) -> Vec<(&'static str, &'static str)> {
    let mut headers = vec![("User-Agent", USER_AGENT)];
    if *platform == Platform::YouTube {
        headers.push(("Accept", "application/json"));
        headers.push(("Accept-Language", "en-US,en;q=0.9"));
    }
    headers
}

/// Parse a poll response batch for the given platform.
///
/// A top-level shape mismatch is a typed parse failure (the batch is
/// dropped); individual items with missing fields fall back to defaults
/// rather than poisoning the batch.
pub fn parse_batch(platform: &Platform, data: &Value) -> Result<Vec<ChatMessage>, ParseError> {
    match platform {
        Platform::YouTube => parse_youtube_batch(data),
        Platform::Kick => parse_kick_batch(data),
        other => Err(ParseError::PayloadShape {
            reason: format!("no poll parser for platform {}", other),
        }),
    }
}

/// YouTube live-chat shape: `items[].snippet` plus a top-level `id`.
fn parse_youtube_batch(data: &Value) -> Result<Vec<ChatMessage>, ParseError> {
    let items = data
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::PayloadShape {
            reason: "items is not an array".to_string(),
        })?;

    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        let snippet = match item.get("snippet") {
            Some(Value::Object(_)) => &item["snippet"],
            _ => continue,
        };

        let timestamp = snippet
            .get("publishedAt")
            .and_then(|v| normalize_timestamp(v).ok())
            .unwrap_or_else(chrono::Utc::now);

        let mut message = ChatMessage::new(
            Platform::YouTube,
            str_field(snippet, "authorDisplayName", "Unknown"),
            str_field(snippet, "displayMessage", ""),
            timestamp,
            str_field(item, "id", ""),
        );
        message.user_id = snippet
            .get("authorChannelId")
            .and_then(Value::as_str)
            .map(str::to_string);
        message.is_moderator = snippet
            .get("isModerator")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        messages.push(message);
    }
    Ok(messages)
}

/// Kick shape: `messages[].sender/content/created_at/id`.
fn parse_kick_batch(data: &Value) -> Result<Vec<ChatMessage>, ParseError> {
    let items = data
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::PayloadShape {
            reason: "messages is not an array".to_string(),
        })?;

    let mut messages = Vec::with_capacity(items.len());
    for item in items {
        let sender = item.get("sender").cloned().unwrap_or(Value::Null);

        let timestamp = item
            .get("created_at")
            .and_then(|v| normalize_timestamp(v).ok())
            .unwrap_or_else(chrono::Utc::now);

        // Kick ids are numeric; coerce to string like every other source.
        let id = match item.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let user_id = match sender.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let mut message = ChatMessage::new(
            Platform::Kick,
            str_field(&sender, "username", "Unknown"),
            str_field(item, "content", ""),
            timestamp,
            id,
        );
        message.user_id = user_id;
        messages.push(message);
    }
    Ok(messages)
}

fn str_field(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// HTTP-polling adapter for one chat URL.
pub struct PollAdapter {
    url: Url,
    platform: Platform,
    client: reqwest::Client,
}

impl PollAdapter {
    pub fn new(url: Url, platform: Platform) -> Self {
        Self {
            url,
            platform,
            client: reqwest::Client::new(),
        }
    }

    /// Run until shutdown. Errors cost one backoff cycle and the loop
    /// continues; nothing escapes to the caller.
    pub async fn run(self, mut ctx: AdapterContext) {
        let mut cursor: Option<String> = None;

        loop {
            if ctx.is_shutdown() {
                break;
            }
            let result = tokio::select! {
                _ = ctx.shutdown_changed() => break,
                result = self.poll_once(&cursor) => result,
            };
            let outcome = match result {
                Ok(batch) => {
                    if let Some(last) = batch.last() {
                        cursor = Some(last.message_id.clone());
                    }
                    for message in batch {
                        ctx.emit(message);
                    }
                    PollOutcome::Success
                }
                Err(e @ SourceError::HttpStatus { .. }) => {
                    tracing::warn!(source = %ctx.key(), error = %e, "Poll failed");
                    PollOutcome::HttpFailure
                }
                Err(e) => {
                    tracing::warn!(source = %ctx.key(), error = %e, "Network error polling chat");
                    PollOutcome::NetworkError
                }
            };
            if ctx.sleep(next_delay(outcome, ctx.poll_interval())).await {
                break;
            }
        }
        tracing::info!(source = %ctx.key(), "Poll adapter stopped");
    }

    fn build_request(&self, cursor: &Option<String>) -> RequestBuilder {
        let mut request = self.client.get(self.url.clone());
        for (name, value) in platform_headers(&self.platform) {
            request = request.header(name, value);
        }
        if let Some(after) = cursor {
            request = request.query(&[("after", after.as_str())]);
        }
        request
    }

    /// One fetch-and-parse cycle. Transport errors propagate for backoff;
    /// a malformed batch is dropped here and costs nothing extra.
    async fn poll_once(&self, cursor: &Option<String>) -> Result<Vec<ChatMessage>, SourceError> {
        let response = self.build_request(cursor).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let data: Value = response.json().await?;
        match parse_batch(&self.platform, &data) {
            Ok(batch) => Ok(batch),
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "Dropping malformed poll batch");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    // ── Delay policy ──

    #[test]
    fn test_success_keeps_normal_cadence() {
        let interval = Duration::from_secs(1);
        assert_eq!(next_delay(PollOutcome::Success, interval), interval);
    }

    #[test]
    fn test_http_failure_backs_off() {
        let interval = Duration::from_secs(1);
        assert_eq!(
            next_delay(PollOutcome::HttpFailure, interval),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_network_error_backs_off() {
        let interval = Duration::from_millis(500);
        assert_eq!(
            next_delay(PollOutcome::NetworkError, interval),
            Duration::from_secs(1)
        );
    }

    // ── Headers ──

    #[test]
    fn test_headers_always_include_user_agent() {
        for platform in [Platform::YouTube, Platform::Kick] {
            let headers = platform_headers(&platform);
            assert!(headers.iter().any(|(name, _)| *name == "User-Agent"));
        }
    }

    #[test]
    fn test_youtube_headers_request_json() {
        let headers = platform_headers(&Platform::YouTube);
        assert!(headers
            .iter()
            .any(|(name, value)| *name == "Accept" && *value == "application/json"));
    }

    // ── YouTube batch ──

    #[test]
    fn test_parse_youtube_batch() {
        let data = json!({
            "items": [
                {
                    "id": "yt-1",
                    "snippet": {
                        "authorDisplayName": "Alice",
                        "displayMessage": "hello",
                        "publishedAt": "2024-05-01T12:00:00Z",
                        "authorChannelId": "UC123",
                        "isModerator": true
                    }
                },
                {
                    "id": "yt-2",
                    "snippet": {
                        "authorDisplayName": "Bob",
                        "displayMessage": "hi"
                    }
                }
            ]
        });

        let batch = parse_youtube_batch(&data).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].platform, Platform::YouTube);
        assert_eq!(batch[0].username, "Alice");
        assert_eq!(batch[0].message, "hello");
        assert_eq!(batch[0].message_id, "yt-1");
        assert_eq!(batch[0].user_id.as_deref(), Some("UC123"));
        assert!(batch[0].is_moderator);
        assert_eq!(batch[0].timestamp.timestamp(), 1_714_564_800);
        assert!(!batch[1].is_moderator);
        assert!(batch[1].badges.is_empty());
    }

    #[test]
    fn test_youtube_item_without_snippet_is_skipped() {
        let data = json!({"items": [{"id": "orphan"}]});
        assert!(parse_youtube_batch(&data).unwrap().is_empty());
    }

    #[test]
    fn test_youtube_missing_items_is_shape_error() {
        let err = parse_youtube_batch(&json!({"kind": "none"})).unwrap_err();
        assert!(matches!(err, ParseError::PayloadShape { .. }));
    }

    // ── Kick batch ──

    #[test]
    fn test_parse_kick_batch() {
        let data = json!({
            "messages": [
                {
                    "id": 42,
                    "content": "first",
                    "created_at": 1_714_564_800,
                    "sender": {"id": 7, "username": "carol"}
                }
            ]
        });

        let batch = parse_kick_batch(&data).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].platform, Platform::Kick);
        assert_eq!(batch[0].username, "carol");
        assert_eq!(batch[0].message, "first");
        assert_eq!(batch[0].message_id, "42");
        assert_eq!(batch[0].user_id.as_deref(), Some("7"));
        assert_eq!(batch[0].timestamp.timestamp(), 1_714_564_800);
    }

    #[test]
    fn test_kick_sender_missing_defaults_username() {
        let data = json!({"messages": [{"id": "1", "content": "x"}]});
        let batch = parse_kick_batch(&data).unwrap();
        assert_eq!(batch[0].username, "Unknown");
        assert!(batch[0].user_id.is_none());
    }

    #[test]
    fn test_kick_missing_messages_is_shape_error() {
        assert!(parse_kick_batch(&json!({})).is_err());
    }

    #[test]
    fn test_parse_batch_rejects_unpollable_platform() {
        assert!(parse_batch(&Platform::Twitch, &json!({})).is_err());
    }

    // ── Batch ordering ──

    #[test]
    fn test_batch_preserves_source_order() {
        let data = json!({
            "messages": [
                {"id": 1, "content": "a", "created_at": 10, "sender": {"username": "u"}},
                {"id": 2, "content": "b", "created_at": 5, "sender": {"username": "u"}},
                {"id": 3, "content": "c", "created_at": 20, "sender": {"username": "u"}}
            ]
        });
        let batch = parse_kick_batch(&data).unwrap();
        let ids: Vec<_> = batch.iter().map(|m| m.message_id.as_str()).collect();
        // Source order, not timestamp order.
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
