//! Chat source descriptors.
//!
//! A source is either a chat URL (adapter chosen by domain) or an opaque
//! authenticated client handle produced by the platform setup/auth code.
//! The explicit tagged union replaces any shape-sniffing: adapter
//! selection is a pure function over the variant.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use url::Url;

use crate::chat::Platform;
use crate::error::{ConfigError, SourceError};

/// One comment fetched through an authenticated client handle.
#[derive(Debug, Clone)]
pub struct ClientComment {
    pub id: String,
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
}

/// Boundary to authenticated SDK-style clients (e.g. the Instagram
/// client produced by the login flow).
///
/// Implementations fetch the comments posted after `since`, in whatever
/// order the backing service returns them. Transient failures surface as
/// errors; the adapter keeps polling.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Platform this client belongs to, for display styling.
    fn platform(&self) -> Platform;

    /// Fetch comments newer than `since` (all available when `None`).
    async fn comments_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ClientComment>, SourceError>;
}

/// An addressable chat origin.
#[derive(Clone)]
pub enum Source {
    /// A chat URL; the adapter is selected by domain.
    Url(Url),
    /// An authenticated client handle with a stable name for identity.
    Client {
        name: String,
        handle: Arc<dyn ChatClient>,
    },
}

impl Source {
    /// Parse a URL source.
    pub fn parse_url(raw: &str) -> Result<Self, ConfigError> {
        Url::parse(raw)
            .map(Source::Url)
            .map_err(|e| ConfigError::InvalidSourceUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Wrap an authenticated client handle.
    pub fn client(name: impl Into<String>, handle: Arc<dyn ChatClient>) -> Self {
        Source::Client {
            name: name.into(),
            handle,
        }
    }

    /// Stable identity key; `start` is idempotent per key.
    pub fn key(&self) -> String {
        match self {
            Source::Url(url) => url.as_str().to_string(),
            Source::Client { name, .. } => format!("client:{}", name),
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Url(url) => f.debug_tuple("Url").field(&url.as_str()).finish(),
            Source::Client { name, .. } => {
                f.debug_struct("Client").field("name", name).finish()
            }
        }
    }
}

/// Transport/adapter family a source resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterKind {
    /// IRC over WebSocket (Twitch chat).
    TwitchIrc,
    /// HTTP polling against a pseudo-chat endpoint.
    HttpPoll(Platform),
    /// Polling an authenticated client handle.
    ClientPoll,
}

/// Select the adapter for a source.
///
/// Pure function: URL sources match on the host's registered domain,
/// client sources always poll their handle. An unrecognized domain is a
/// typed error; the caller surfaces it once and the source never starts.
pub fn select_adapter(source: &Source) -> Result<AdapterKind, SourceError> {
    match source {
        Source::Client { .. } => Ok(AdapterKind::ClientPoll),
        Source::Url(url) => {
            let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
            if host_matches(&host, "twitch.tv") {
                Ok(AdapterKind::TwitchIrc)
            } else if host_matches(&host, "youtube.com") {
                Ok(AdapterKind::HttpPoll(Platform::YouTube))
            } else if host_matches(&host, "kick.com") {
                Ok(AdapterKind::HttpPoll(Platform::Kick))
            } else {
                Err(SourceError::UnsupportedPlatform {
                    key: source.key(),
                })
            }
        }
    }
}

/// Match `host` against a platform domain, accepting subdomains but not
/// lookalike registrable domains (`notkick.com` must not match).
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}
