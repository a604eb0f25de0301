//! IRC-over-WebSocket chat adapter (Twitch).
//!
//! Opens a persistent WebSocket to the IRC gateway, performs the anonymous
//! handshake (capability request, guest nick, channel join), then receives
//! line-oriented frames. Keep-alive PINGs are answered inline. Messages
//! use the tag-prefixed IRC format:
//!
//! ```text
//! @key=value;key=value :nick!user@host PRIVMSG #channel :message text
//! ```
//!
//! Parsing is an explicit grammar — tag block, prefix, command, params,
//! trailing — with a typed failure per clause. Unparseable lines are
//! dropped and logged, never surfaced.

use std::collections::HashMap;

use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::chat::manager::AdapterContext;
use crate::chat::message::{ChatMessage, Platform, normalize_timestamp};
use crate::error::{ParseError, SourceError};

/// Twitch IRC WebSocket gateway.
pub const TWITCH_IRC_ENDPOINT: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Guest nick for the anonymous read-only handshake.
const ANONYMOUS_NICK: &str = "justinfan13579";

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    /// Unescaped `@key=value` tags; empty when the line has no tag block.
    pub tags: HashMap<String, String>,
    /// Nick portion of the `:nick!user@host` prefix.
    pub nick: Option<String>,
    pub command: String,
    /// Middle parameters (e.g. the `#channel`).
    pub params: Vec<String>,
    /// Text after the ` :` separator.
    pub trailing: Option<String>,
}

/// Parse one IRC line into its clauses.
pub fn parse_irc_line(line: &str) -> Result<IrcLine, ParseError> {
    let mut rest = line.trim_end_matches(['\r', '\n']);

    let tags = if let Some(stripped) = rest.strip_prefix('@') {
        let (block, remainder) = stripped
            .split_once(' ')
            .ok_or_else(|| ParseError::IrcTags(line.to_string()))?;
        rest = remainder;
        parse_tag_block(block)?
    } else {
        HashMap::new()
    };

    let nick = if let Some(stripped) = rest.strip_prefix(':') {
        let (prefix, remainder) = stripped
            .split_once(' ')
            .ok_or_else(|| ParseError::IrcPrefix(line.to_string()))?;
        rest = remainder;
        Some(parse_prefix_nick(prefix)?)
    } else {
        None
    };

    // Trailing begins at the first ` :`; everything before it is
    // space-separated command + params.
    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trail)) => (head, Some(trail.to_string())),
        None => (rest, None),
    };

    let mut tokens = head.split_ascii_whitespace();
    let command = tokens
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ParseError::IrcCommand(line.to_string()))?
        .to_string();
    let params = tokens.map(str::to_string).collect();

    Ok(IrcLine {
        tags,
        nick,
        command,
        params,
        trailing,
    })
}

/// Parse the `key=value;key=value` tag block, unescaping values.
fn parse_tag_block(block: &str) -> Result<HashMap<String, String>, ParseError> {
    let mut tags = HashMap::new();
    for pair in block.split(';') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            return Err(ParseError::IrcTags(block.to_string()));
        }
        tags.insert(key.to_string(), unescape_tag_value(value));
    }
    Ok(tags)
}

/// IRCv3 tag-value unescaping: `\:` → `;`, `\s` → space, `\\` → `\`,
/// `\r`/`\n` → CR/LF. A dangling backslash is dropped.
fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Extract the nick from `nick!user@host` (nick alone is also valid).
fn parse_prefix_nick(prefix: &str) -> Result<String, ParseError> {
    let nick = prefix.split(['!', '@']).next().unwrap_or_default();
    if nick.is_empty() {
        return Err(ParseError::IrcPrefix(prefix.to_string()));
    }
    Ok(nick.to_string())
}

/// Convert a parsed PRIVMSG into the unified message model.
pub fn privmsg_to_chat_message(line: &IrcLine) -> Result<ChatMessage, ParseError> {
    line.params
        .iter()
        .find(|p| p.starts_with('#'))
        .ok_or_else(|| ParseError::IrcChannel {
            command: line.command.clone(),
        })?;

    let nick = line
        .nick
        .clone()
        .ok_or_else(|| ParseError::IrcPrefix(line.command.clone()))?;

    let username = line
        .tags
        .get("display-name")
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or(nick);

    let timestamp = line
        .tags
        .get("tmi-sent-ts")
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|ms| normalize_timestamp(&serde_json::Value::from(ms)).ok())
        .unwrap_or_else(Utc::now);

    let badges: Vec<String> = line
        .tags
        .get("badges")
        .map(|raw| {
            raw.split(',')
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let is_moderator = badges.iter().any(|b| b.contains("moderator"))
        || line.tags.get("mod").is_some_and(|v| v == "1");
    let is_subscriber = badges.iter().any(|b| b.contains("subscriber"))
        || line.tags.get("subscriber").is_some_and(|v| v == "1");

    let mut message = ChatMessage::new(
        Platform::Twitch,
        username,
        line.trailing.clone().unwrap_or_default(),
        timestamp,
        line.tags.get("id").cloned().unwrap_or_default(),
    );
    message.user_id = line.tags.get("user-id").cloned();
    message.is_moderator = is_moderator;
    message.is_subscriber = is_subscriber;
    message.badges = badges;
    Ok(message)
}

/// Derive the channel to join from a chat URL path.
///
/// Accepts both `twitch.tv/<channel>` and the popout form
/// `twitch.tv/popout/<channel>/chat`.
pub fn channel_from_url(url: &Url) -> Option<String> {
    let mut segments = url
        .path_segments()?
        .filter(|s| !s.is_empty() && *s != "popout" && *s != "chat");
    segments.next().map(|s| s.to_ascii_lowercase())
}

/// IRC-over-WebSocket adapter for one channel.
pub struct IrcAdapter {
    endpoint: String,
    channel: String,
}

impl IrcAdapter {
    pub fn new(url: &Url) -> Result<Self, SourceError> {
        let channel = channel_from_url(url).ok_or_else(|| SourceError::ConnectFailed {
            key: url.as_str().to_string(),
            reason: "no channel in URL path".to_string(),
        })?;
        Ok(Self {
            endpoint: TWITCH_IRC_ENDPOINT.to_string(),
            channel,
        })
    }

    /// Run until shutdown. Reconnects with a backoff after transport
    /// failures; session errors never escape to the caller.
    pub async fn run(self, mut ctx: AdapterContext) {
        loop {
            if ctx.is_shutdown() {
                break;
            }
            match self.session(&mut ctx).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(
                        source = %ctx.key(),
                        error = %e,
                        "IRC session ended, reconnecting after backoff"
                    );
                    if ctx.sleep_backoff().await {
                        break;
                    }
                }
            }
        }
        tracing::info!(source = %ctx.key(), "IRC adapter stopped");
    }

    /// One connect-handshake-receive session.
    ///
    /// Returns `Ok(())` only when shutdown was observed; the WebSocket is
    /// closed before returning on every path.
    async fn session(&self, ctx: &mut AdapterContext) -> Result<(), SourceError> {
        let connected = tokio::select! {
            _ = ctx.shutdown_changed() => return Ok(()),
            result = connect_async(self.endpoint.as_str()) => result?,
        };
        let (stream, _) = connected;
        let (mut write, mut read) = stream.split();

        write
            .send(Message::from(
                "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
            ))
            .await?;
        write
            .send(Message::from(format!("NICK {}", ANONYMOUS_NICK)))
            .await?;
        write
            .send(Message::from(format!("JOIN #{}", self.channel)))
            .await?;
        tracing::info!(channel = %self.channel, "Joined IRC channel");

        loop {
            tokio::select! {
                _ = ctx.shutdown_changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        for raw in text.as_str().lines() {
                            self.handle_line(raw, &mut write, ctx).await?;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(SourceError::Transport {
                            key: ctx.key().to_string(),
                            reason: "connection closed by server".to_string(),
                        });
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    async fn handle_line<S>(
        &self,
        raw: &str,
        write: &mut S,
        ctx: &mut AdapterContext,
    ) -> Result<(), SourceError>
    where
        S: Sink<Message> + Unpin,
        S::Error: Into<tokio_tungstenite::tungstenite::Error>,
    {
        if raw.is_empty() {
            return Ok(());
        }

        // Protocol keep-alive: answer inline, nothing else to do.
        if let Some(payload) = raw.strip_prefix("PING") {
            let pong = format!("PONG{}", payload);
            return write
                .send(Message::from(pong))
                .await
                .map_err(|e| SourceError::WebSocket(e.into()));
        }

        match parse_irc_line(raw) {
            Ok(line) if line.command == "PRIVMSG" => match privmsg_to_chat_message(&line) {
                Ok(message) => ctx.emit(message),
                Err(e) => tracing::debug!(error = %e, raw, "Dropping unparseable PRIVMSG"),
            },
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, raw, "Dropping malformed IRC line"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Tag block ──

    #[test]
    fn test_parse_tag_block_basic() {
        let tags = parse_tag_block("display-name=Alice;mod=1").unwrap();
        assert_eq!(tags["display-name"], "Alice");
        assert_eq!(tags["mod"], "1");
    }

    #[test]
    fn test_parse_tag_block_empty_value() {
        let tags = parse_tag_block("emotes=;id=abc").unwrap();
        assert_eq!(tags["emotes"], "");
        assert_eq!(tags["id"], "abc");
    }

    #[test]
    fn test_parse_tag_block_valueless_key() {
        let tags = parse_tag_block("flag;id=1").unwrap();
        assert_eq!(tags["flag"], "");
    }

    #[test]
    fn test_parse_tag_block_rejects_empty_key() {
        assert!(parse_tag_block("=value").is_err());
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"semi\:colon"), "semi;colon");
        assert_eq!(unescape_tag_value(r"a\sspace"), "a space");
        assert_eq!(unescape_tag_value(r"back\\slash"), r"back\slash");
        assert_eq!(unescape_tag_value(r"dangling\"), "dangling");
    }

    // ── Prefix ──

    #[test]
    fn test_parse_prefix_full() {
        assert_eq!(parse_prefix_nick("alice!alice@alice.tmi.twitch.tv").unwrap(), "alice");
    }

    #[test]
    fn test_parse_prefix_nick_only() {
        assert_eq!(parse_prefix_nick("tmi.twitch.tv").unwrap(), "tmi.twitch.tv");
    }

    #[test]
    fn test_parse_prefix_empty_is_error() {
        assert!(parse_prefix_nick("!user@host").is_err());
    }

    // ── Full line ──

    #[test]
    fn test_parse_full_privmsg() {
        let line = parse_irc_line(
            "@badges=moderator/1;display-name=Alice;id=m1 :alice!alice@alice.tmi.twitch.tv PRIVMSG #somechannel :hello world",
        )
        .unwrap();
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.nick.as_deref(), Some("alice"));
        assert_eq!(line.params, vec!["#somechannel"]);
        assert_eq!(line.trailing.as_deref(), Some("hello world"));
        assert_eq!(line.tags["display-name"], "Alice");
    }

    #[test]
    fn test_parse_line_without_tags() {
        let line =
            parse_irc_line(":bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :hi").unwrap();
        assert!(line.tags.is_empty());
        assert_eq!(line.nick.as_deref(), Some("bob"));
    }

    #[test]
    fn test_parse_line_without_prefix() {
        let line = parse_irc_line("PING :tmi.twitch.tv").unwrap();
        assert_eq!(line.command, "PING");
        assert!(line.nick.is_none());
        assert_eq!(line.trailing.as_deref(), Some("tmi.twitch.tv"));
    }

    #[test]
    fn test_parse_line_strips_crlf() {
        let line = parse_irc_line(":n!u@h PRIVMSG #c :text\r\n").unwrap();
        assert_eq!(line.trailing.as_deref(), Some("text"));
    }

    #[test]
    fn test_parse_trailing_with_colons() {
        let line = parse_irc_line(":n!u@h PRIVMSG #c :a :b :c").unwrap();
        assert_eq!(line.trailing.as_deref(), Some("a :b :c"));
    }

    #[test]
    fn test_parse_empty_line_is_command_error() {
        assert!(matches!(
            parse_irc_line(""),
            Err(ParseError::IrcCommand(_))
        ));
    }

    #[test]
    fn test_parse_tags_without_rest_is_error() {
        assert!(matches!(
            parse_irc_line("@id=1"),
            Err(ParseError::IrcTags(_))
        ));
    }

    // ── PRIVMSG conversion ──

    fn sample_line() -> IrcLine {
        parse_irc_line(
            "@badges=moderator/1,subscriber/6;display-name=Alice;id=m1;tmi-sent-ts=1714564800000;user-id=u9 :alice!alice@a.tmi.twitch.tv PRIVMSG #chan :hello",
        )
        .unwrap()
    }

    #[test]
    fn test_privmsg_conversion_fields() {
        let msg = privmsg_to_chat_message(&sample_line()).unwrap();
        assert_eq!(msg.platform, Platform::Twitch);
        assert_eq!(msg.username, "Alice");
        assert_eq!(msg.message, "hello");
        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.user_id.as_deref(), Some("u9"));
        assert!(msg.is_moderator);
        assert!(msg.is_subscriber);
        assert_eq!(msg.badges, vec!["moderator/1", "subscriber/6"]);
        assert_eq!(msg.timestamp.timestamp(), 1_714_564_800);
    }

    #[test]
    fn test_privmsg_username_falls_back_to_nick() {
        let line = parse_irc_line(":carol!c@h PRIVMSG #chan :yo").unwrap();
        let msg = privmsg_to_chat_message(&line).unwrap();
        assert_eq!(msg.username, "carol");
        assert!(msg.badges.is_empty());
    }

    #[test]
    fn test_privmsg_mod_tag_without_badges() {
        let line = parse_irc_line("@mod=1 :d!d@h PRIVMSG #chan :x").unwrap();
        let msg = privmsg_to_chat_message(&line).unwrap();
        assert!(msg.is_moderator);
        assert!(!msg.is_subscriber);
    }

    #[test]
    fn test_privmsg_without_channel_is_error() {
        let line = parse_irc_line(":e!e@h PRIVMSG :no channel").unwrap();
        assert!(matches!(
            privmsg_to_chat_message(&line),
            Err(ParseError::IrcChannel { .. })
        ));
    }

    #[test]
    fn test_privmsg_without_prefix_is_error() {
        let line = parse_irc_line("@id=1 PRIVMSG #chan :ghost").unwrap();
        assert!(matches!(
            privmsg_to_chat_message(&line),
            Err(ParseError::IrcPrefix(_))
        ));
    }

    // ── Channel derivation ──

    #[test]
    fn test_channel_from_plain_url() {
        let url = Url::parse("https://www.twitch.tv/SomeChannel").unwrap();
        assert_eq!(channel_from_url(&url).as_deref(), Some("somechannel"));
    }

    #[test]
    fn test_channel_from_popout_url() {
        let url = Url::parse("https://www.twitch.tv/popout/somechannel/chat?popout=").unwrap();
        assert_eq!(channel_from_url(&url).as_deref(), Some("somechannel"));
    }

    #[test]
    fn test_channel_missing_from_bare_url() {
        let url = Url::parse("https://www.twitch.tv/").unwrap();
        assert_eq!(channel_from_url(&url), None);
    }

    #[test]
    fn test_adapter_rejects_channelless_url() {
        let url = Url::parse("https://www.twitch.tv/").unwrap();
        assert!(IrcAdapter::new(&url).is_err());
    }
}
