//! Bounded scrollback of rendered display lines.

use std::collections::VecDeque;

use crate::display::format::DisplayLine;

/// Ordered, bounded history of display lines backing the scrolling body.
///
/// Append-only with FIFO eviction beyond capacity. Owned by the render
/// side and mutated only under the painter lock.
pub struct RenderBuffer {
    lines: VecDeque<DisplayLine>,
    capacity: usize,
}

impl RenderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append lines, evicting from the head once over capacity.
    pub fn append(&mut self, lines: Vec<DisplayLine>) {
        for line in lines {
            self.lines.push_back(line);
            while self.lines.len() > self.capacity {
                self.lines.pop_front();
            }
        }
    }

    /// The most recent `count` lines, oldest first.
    pub fn tail(&self, count: usize) -> impl Iterator<Item = &DisplayLine> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
