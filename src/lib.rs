//! simulchat — multi-platform live-stream chat aggregation.
//!
//! Connects to the chat of several streaming platforms at once (IRC over
//! WebSocket, HTTP-polled pseudo-chat APIs, authenticated client
//! handles), normalizes everything into one message model, and renders a
//! unified color-coded view in the terminal: a fixed status header over a
//! scrolling, word-wrapped chat body.

pub mod chat;
pub mod config;
pub mod display;
pub mod error;
pub mod forward;
pub mod source;

pub use chat::{ChatManager, ChatMessage, Platform};
pub use config::Config;
pub use error::{Error, Result};
pub use source::{ChatClient, Source};
