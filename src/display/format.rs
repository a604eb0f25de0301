//! Message formatting and text reflow.
//!
//! A [`ChatMessage`] becomes one or more [`DisplayLine`]s: a head line
//! carrying the colorized `HH:MM:SS [TAG] username: ` prefix, then one
//! continuation line per wrapped or embedded-newline segment, indented by
//! the prefix width so text stays aligned under the username. The prefix
//! width varies per message with the username length; alignment is
//! per-message, not global.

use chrono::Local;
use crossterm::style::{Color, Stylize};

use crate::chat::{ChatMessage, Platform};

/// Display color for a platform's tag.
pub fn platform_color(platform: &Platform) -> Color {
    match platform {
        Platform::Twitch => Color::DarkMagenta,
        Platform::YouTube => Color::DarkRed,
        Platform::Kick => Color::DarkGreen,
        Platform::Instagram => Color::DarkYellow,
        Platform::Other(_) => Color::Grey,
    }
}

/// Whether a row is a message head or wrapped overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Head,
    Continuation,
}

/// One physical terminal row of rendered chat output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub kind: LineKind,
    /// Row content, including ANSI styling on head lines.
    pub text: String,
}

/// Build the un-styled prefix used for width accounting.
fn plain_prefix(time: &str, platform: &Platform, username: &str) -> String {
    format!("{} {} {}: ", time, platform.tag(), username)
}

/// Build the colorized prefix: cyan time, platform-colored tag, blue
/// username.
fn styled_prefix(time: &str, platform: &Platform, username: &str) -> String {
    format!(
        "{} {} {}: ",
        time.dark_cyan(),
        platform.tag().with(platform_color(platform)),
        username.dark_blue(),
    )
}

/// Greedy word wrap of one segment at `width` columns.
///
/// Never splits a word that fits on its own line; a single word longer
/// than `width` is placed alone, oversized. An empty segment still
/// produces exactly one (empty) line.
fn wrap_segment(segment: &str, width: usize) -> Vec<String> {
    // Floor of one column: a non-positive available width must not wrap
    // into infinite single-character lines.
    let width = width.max(1);

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in segment.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    lines.push(current);
    lines
}

/// Reflow a message into display lines for the given terminal width.
///
/// The first line carries the full colorized prefix; every further line
/// (from wrapping or an embedded newline) is indented by the prefix
/// width. Always yields at least one line, so the head prefix stays
/// visible even for an empty message.
pub fn format_message_at(
    time: &str,
    platform: &Platform,
    username: &str,
    message: &str,
    terminal_width: usize,
) -> Vec<DisplayLine> {
    let prefix = plain_prefix(time, platform, username);
    let prefix_width = prefix.chars().count();
    let body_width = terminal_width.saturating_sub(prefix_width);

    let mut segments: Vec<String> = Vec::new();
    for part in message.split('\n') {
        segments.extend(wrap_segment(part, body_width));
    }

    let indent = " ".repeat(prefix_width);
    segments
        .into_iter()
        .enumerate()
        .map(|(i, segment)| {
            if i == 0 {
                DisplayLine {
                    kind: LineKind::Head,
                    text: format!("{}{}", styled_prefix(time, platform, username), segment),
                }
            } else {
                DisplayLine {
                    kind: LineKind::Continuation,
                    text: format!("{}{}", indent, segment),
                }
            }
        })
        .collect()
}

/// Reflow a chat message using its own timestamp (local wall clock).
pub fn format_message(message: &ChatMessage, terminal_width: usize) -> Vec<DisplayLine> {
    let time = message
        .timestamp
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();
    format_message_at(
        &time,
        &message.platform,
        &message.username,
        &message.message,
        terminal_width,
    )
}

/// Inline error row appended to the buffer when rendering itself fails,
/// so the failure is visible without crashing the display loop.
pub fn error_line(reason: &str) -> DisplayLine {
    DisplayLine {
        kind: LineKind::Head,
        text: format!("{}", format!("[display error] {}", reason).dark_red()),
    }
}
