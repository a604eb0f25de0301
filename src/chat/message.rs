//! Unified chat message model.
//!
//! Every adapter normalizes its source-native payload into [`ChatMessage`]
//! before anything downstream sees it. Timestamps arrive as ISO-8601
//! strings, epoch seconds, or epoch milliseconds depending on the
//! platform; all are converted to `DateTime<Utc>` at ingestion.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Chat platform a message originated from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Twitch,
    YouTube,
    Kick,
    Instagram,
    /// A platform the display has no dedicated styling for.
    Other(String),
}

impl Platform {
    /// Short display tag, e.g. `[TWITCH]`.
    pub fn tag(&self) -> String {
        match self {
            Platform::Twitch => "[TWITCH]".to_string(),
            Platform::YouTube => "[YT]".to_string(),
            Platform::Kick => "[KICK]".to_string(),
            Platform::Instagram => "[IG]".to_string(),
            Platform::Other(name) => format!("[{}]", name.to_uppercase()),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Twitch => write!(f, "twitch"),
            Platform::YouTube => write!(f, "youtube"),
            Platform::Kick => write!(f, "kick"),
            Platform::Instagram => write!(f, "instagram"),
            Platform::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Standardized chat message, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub platform: Platform,
    /// Display name, string-coerced regardless of the source's native
    /// author representation.
    pub username: String,
    /// Raw message body; may contain embedded newlines.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Source-native unique id; drives dedup for poll-based sources.
    pub message_id: String,
    pub user_id: Option<String>,
    pub is_moderator: bool,
    pub is_subscriber: bool,
    /// Always present; empty when the source supplies none.
    pub badges: Vec<String>,
}

impl ChatMessage {
    /// Construct a message with all optional metadata defaulted.
    pub fn new(
        platform: Platform,
        username: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            username: username.into(),
            message: message.into(),
            timestamp,
            message_id: message_id.into(),
            user_id: None,
            is_moderator: false,
            is_subscriber: false,
            badges: Vec::new(),
        }
    }
}

/// Normalize a source-native timestamp value into `DateTime<Utc>`.
///
/// Accepts RFC 3339 / ISO-8601 strings (`2024-05-01T12:00:00Z`), integer
/// or float epoch seconds, and integer epoch milliseconds. Values above
/// ~10^12 are interpreted as milliseconds.
pub fn normalize_timestamp(value: &serde_json::Value) -> Result<DateTime<Utc>, ParseError> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ParseError::Timestamp { value: s.clone() }),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let parsed = if i > 1_000_000_000_000 {
                    Utc.timestamp_millis_opt(i).single()
                } else {
                    Utc.timestamp_opt(i, 0).single()
                };
                parsed.ok_or_else(|| ParseError::Timestamp {
                    value: i.to_string(),
                })
            } else if let Some(f) = n.as_f64() {
                Utc.timestamp_opt(f.trunc() as i64, (f.fract() * 1e9) as u32)
                    .single()
                    .ok_or_else(|| ParseError::Timestamp {
                        value: f.to_string(),
                    })
            } else {
                Err(ParseError::Timestamp {
                    value: n.to_string(),
                })
            }
        }
        other => Err(ParseError::Timestamp {
            value: other.to_string(),
        }),
    }
}
