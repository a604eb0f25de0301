//! Multi-platform chat aggregation.
//!
//! Adapters translate each platform's native transport (IRC over
//! WebSocket, HTTP polling, authenticated client handles) into the
//! unified [`ChatMessage`] model; the [`ChatManager`] owns their
//! lifecycles and fans messages out to registered listeners.

pub mod client;
pub mod irc;
mod manager;
mod message;
pub mod poll;

pub use manager::{AdapterContext, ChatManager, ListenerId};
pub use message::{ChatMessage, Platform, normalize_timestamp};
