//! Terminal painting.
//!
//! The painter owns two disjoint screen regions: a fixed-height header
//! (title, platform legend, forwarder status, quit hint) and a scrolling
//! body holding the tail of the render buffer. Every repaint builds the
//! whole frame — cursor moves, clears, content, colors — into one byte
//! buffer and writes it in a single flush, so concurrent diagnostics or
//! partial writes never tear the display. The cursor is parked on the
//! line after the last visible row.
//!
//! Both repaint triggers (the 1 s header tick and the on-message body
//! refresh) serialize through the one mutex wrapping this type.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, Print, Stylize};
use crossterm::terminal::{self, Clear, ClearType};

use crate::chat::{ChatMessage, Platform};
use crate::display::buffer::RenderBuffer;
use crate::display::format::{self, DisplayLine};

/// Rows the header occupies at the top of the screen.
pub const HEADER_HEIGHT: u16 = 7;

/// Fallback dimensions when the terminal size cannot be detected.
const FALLBACK_SIZE: (u16, u16) = (80, 24);

/// How many body rows fit below the header (one row is reserved to park
/// the cursor on).
pub fn visible_rows(terminal_height: u16) -> usize {
    terminal_height.saturating_sub(HEADER_HEIGHT + 1) as usize
}

/// Build the header block: banner, centered title, platform legend,
/// forwarder LIVE/OFFLINE cells, quit hint.
pub fn header_lines(width: usize, forwarders: &[(String, bool)]) -> Vec<String> {
    let rule = "=".repeat(width);
    let title = "Multi-Platform Chat Display";
    let pad = width.saturating_sub(title.len()) / 2;
    let title_line = format!("{}{}", " ".repeat(pad), title.dark_cyan());

    let legend = [
        Platform::Twitch,
        Platform::YouTube,
        Platform::Kick,
        Platform::Instagram,
    ]
    .iter()
    .map(|p| {
        p.tag()
            .with(format::platform_color(p))
            .to_string()
    })
    .collect::<Vec<_>>()
    .join(" ");

    let status = if forwarders.is_empty() {
        "Forwarders: (none)".to_string()
    } else {
        let cells = forwarders
            .iter()
            .map(|(label, running)| {
                let state = if *running {
                    "LIVE".with(Color::DarkGreen)
                } else {
                    "OFFLINE".with(Color::DarkRed)
                };
                format!("{} {}", label, state)
            })
            .collect::<Vec<_>>()
            .join("  ");
        format!("Forwarders: {}", cells)
    };

    vec![
        rule.clone(),
        title_line,
        rule.clone(),
        format!("Legend: {}", legend),
        status,
        "Press q to quit".to_string(),
        rule,
    ]
}

/// Owns the screen: render buffer, current dimensions, output handle.
pub struct Painter<W: Write> {
    out: W,
    buffer: RenderBuffer,
    header_width: u16,
    size: (u16, u16),
    fixed_size: Option<(u16, u16)>,
}

impl Painter<io::Stdout> {
    pub fn stdout(capacity: usize, header_width: u16) -> Self {
        Painter::new(io::stdout(), capacity, header_width)
    }
}

impl<W: Write> Painter<W> {
    pub fn new(out: W, capacity: usize, header_width: u16) -> Self {
        Self {
            out,
            buffer: RenderBuffer::new(capacity),
            header_width,
            size: FALLBACK_SIZE,
            fixed_size: None,
        }
    }

    /// Pin the dimensions instead of re-detecting them each cycle; used
    /// by tests and non-tty sinks.
    pub fn with_fixed_size(mut self, size: (u16, u16)) -> Self {
        self.fixed_size = Some(size);
        self.size = size;
        self
    }

    /// Re-detect terminal dimensions; called at the start of every paint
    /// cycle so resizes take effect on the next frame.
    fn refresh_size(&mut self) {
        self.size = match self.fixed_size {
            Some(size) => size,
            None => terminal::size().unwrap_or(FALLBACK_SIZE),
        };
    }

    pub fn terminal_width(&self) -> usize {
        self.size.0 as usize
    }

    fn effective_header_width(&self) -> usize {
        (self.header_width.min(self.size.0)) as usize
    }

    fn park_row(&self) -> u16 {
        HEADER_HEIGHT + visible_rows(self.size.1) as u16
    }

    /// Format a message at the current width and append its lines.
    ///
    /// A formatting failure becomes an inline error line in the buffer —
    /// visible to the operator, fatal to nothing.
    pub fn append_message(&mut self, message: &ChatMessage) {
        let width = self.terminal_width();
        let lines = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            format::format_message(message, width)
        }))
        .unwrap_or_else(|_| vec![format::error_line("message formatting failed")]);
        self.buffer.append(lines);
    }

    /// Append an inline error line (render failures surface here).
    pub fn append_error(&mut self, reason: &str) {
        self.buffer.append(vec![format::error_line(reason)]);
    }

    /// Clear the whole screen and paint both regions.
    pub fn paint_full(&mut self, forwarders: &[(String, bool)]) -> io::Result<()> {
        self.refresh_size();
        let mut frame: Vec<u8> = Vec::new();
        queue!(frame, Clear(ClearType::All))?;
        self.queue_header(&mut frame, forwarders)?;
        self.queue_body(&mut frame)?;
        self.flush_frame(&frame)
    }

    /// Repaint the header region only.
    pub fn paint_header(&mut self, forwarders: &[(String, bool)]) -> io::Result<()> {
        self.refresh_size();
        let mut frame: Vec<u8> = Vec::new();
        self.queue_header(&mut frame, forwarders)?;
        self.flush_frame(&frame)
    }

    /// Repaint the body region only.
    pub fn paint_body(&mut self) -> io::Result<()> {
        self.refresh_size();
        let mut frame: Vec<u8> = Vec::new();
        self.queue_body(&mut frame)?;
        self.flush_frame(&frame)
    }

    fn queue_header(
        &self,
        frame: &mut Vec<u8>,
        forwarders: &[(String, bool)],
    ) -> io::Result<()> {
        let lines = header_lines(self.effective_header_width(), forwarders);
        for (row, line) in lines.iter().enumerate().take(HEADER_HEIGHT as usize) {
            queue!(
                frame,
                MoveTo(0, row as u16),
                Clear(ClearType::CurrentLine),
                Print(line)
            )?;
        }
        queue!(frame, MoveTo(0, self.park_row()))?;
        Ok(())
    }

    fn queue_body(&self, frame: &mut Vec<u8>) -> io::Result<()> {
        let visible = visible_rows(self.size.1);
        let lines: Vec<&DisplayLine> = self.buffer.tail(visible).collect();

        for row in 0..visible {
            queue!(
                frame,
                MoveTo(0, HEADER_HEIGHT + row as u16),
                Clear(ClearType::CurrentLine)
            )?;
            if let Some(line) = lines.get(row) {
                queue!(frame, Print(&line.text))?;
            }
        }
        queue!(frame, MoveTo(0, self.park_row()))?;
        Ok(())
    }

    /// Write the assembled frame in a single flush.
    fn flush_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.out.write_all(frame)?;
        self.out.flush()
    }

    /// Drop all buffered lines; called once on shutdown.
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    #[cfg(test)]
    fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
