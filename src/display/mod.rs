//! Concurrent terminal display.
//!
//! The async side hands messages into a bounded queue; two dedicated
//! threads own all terminal writes from there:
//!
//! - the **body** thread drains the queue (100 ms pop timeout so it
//!   notices the stop flag), reflows each message and repaints the
//!   scrolling region;
//! - the **header** thread repaints the fixed header every second,
//!   re-polling forwarder liveness as it goes.
//!
//! Both repaint paths serialize through the one mutex around the
//! [`Painter`], so their escape sequences never interleave.

mod buffer;
mod format;
mod input;
mod painter;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub use buffer::RenderBuffer;
pub use format::{DisplayLine, LineKind, format_message, format_message_at};
pub use input::{ShutdownReason, TerminalGuard, is_quit_key, spawn_key_watcher};
pub use painter::{HEADER_HEIGHT, Painter, header_lines, visible_rows};

use crate::chat::ChatMessage;
use crate::config::Config;
use crate::error::DisplayError;
use crate::forward::Forwarder;

/// Bound on the async-to-render handoff queue.
const QUEUE_BOUND: usize = 256;

/// Queue pop timeout; the body thread re-checks the stop flag this often.
const QUEUE_POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Header repaint cadence.
const HEADER_REFRESH: Duration = Duration::from_secs(1);

type SharedPainter = Arc<Mutex<Painter<io::Stdout>>>;
type SharedForwarders = Arc<Mutex<Vec<Forwarder>>>;

/// Running terminal display: owns the render threads and the handoff
/// queue feeding them.
pub struct ChatDisplay {
    tx: SyncSender<ChatMessage>,
    stop: Arc<AtomicBool>,
    painter: SharedPainter,
    body_thread: Option<thread::JoinHandle<()>>,
    header_thread: Option<thread::JoinHandle<()>>,
}

impl ChatDisplay {
    /// Clear the screen, paint the initial frame, and start both render
    /// threads.
    pub fn start(
        config: &Config,
        forwarders: SharedForwarders,
    ) -> Result<Self, DisplayError> {
        let painter = Arc::new(Mutex::new(Painter::stdout(
            config.buffer_capacity,
            config.header_width,
        )));

        {
            let snapshot = poll_forwarders(&forwarders);
            let mut guard = painter.lock().expect("painter lock poisoned");
            guard.paint_full(&snapshot)?;
        }

        let (tx, rx) = mpsc::sync_channel(QUEUE_BOUND);
        let stop = Arc::new(AtomicBool::new(false));

        let body_thread = {
            let painter = Arc::clone(&painter);
            let stop = Arc::clone(&stop);
            thread::spawn(move || body_loop(rx, painter, stop))
        };

        let header_thread = {
            let painter = Arc::clone(&painter);
            let stop = Arc::clone(&stop);
            let forwarders = Arc::clone(&forwarders);
            thread::spawn(move || header_loop(painter, forwarders, stop))
        };

        Ok(Self {
            tx,
            stop,
            painter,
            body_thread: Some(body_thread),
            header_thread: Some(header_thread),
        })
    }

    /// Queue handle for listeners; send blocks briefly when the render
    /// side falls behind the bound.
    pub fn sender(&self) -> SyncSender<ChatMessage> {
        self.tx.clone()
    }

    /// Stop both render threads and clear the scrollback.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.body_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.header_thread.take() {
            let _ = handle.join();
        }
        self.painter
            .lock()
            .expect("painter lock poisoned")
            .clear_buffer();
    }
}

impl Drop for ChatDisplay {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Snapshot forwarder liveness for the header.
fn poll_forwarders(forwarders: &SharedForwarders) -> Vec<(String, bool)> {
    forwarders
        .lock()
        .expect("forwarder lock poisoned")
        .iter_mut()
        .map(|f| (f.label().to_string(), f.is_running()))
        .collect()
}

/// Body refresh: drain the queue, append, repaint.
fn body_loop(
    rx: mpsc::Receiver<ChatMessage>,
    painter: SharedPainter,
    stop: Arc<AtomicBool>,
) {
    loop {
        match rx.recv_timeout(QUEUE_POP_TIMEOUT) {
            Ok(message) => {
                let mut guard = painter.lock().expect("painter lock poisoned");
                guard.append_message(&message);
                // Fold in whatever else queued up while we held the lock;
                // one repaint covers the batch.
                while let Ok(more) = rx.try_recv() {
                    guard.append_message(&more);
                }
                if let Err(e) = guard.paint_body() {
                    guard.append_error(&e.to_string());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Header refresh: repaint once a second with fresh forwarder liveness.
fn header_loop(
    painter: SharedPainter,
    forwarders: SharedForwarders,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let snapshot = poll_forwarders(&forwarders);
        {
            let mut guard = painter.lock().expect("painter lock poisoned");
            if let Err(e) = guard.paint_header(&snapshot) {
                guard.append_error(&e.to_string());
            }
        }

        // Sleep the refresh interval in short slices so stop lands fast.
        let mut remaining = HEADER_REFRESH;
        while !stop.load(Ordering::Relaxed) && remaining > Duration::ZERO {
            let slice = remaining.min(QUEUE_POP_TIMEOUT);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}
