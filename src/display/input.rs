//! Keyboard input and terminal state guard.
//!
//! A dedicated thread polls raw-mode key events on a short timeout and
//! reports the quit key; everything else is ignored. With the terminal
//! in raw mode the tty no longer turns Ctrl-C into SIGINT, so the key
//! watcher maps it to the same quit event; signals sent from outside are
//! handled separately by the runtime's signal future.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossterm::cursor::{Hide, Show};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::{event, execute, terminal};

/// Why the process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    QuitKey,
    Interrupt,
}

/// RAII guard for raw mode and cursor visibility.
///
/// Restores the terminal on drop, including during a panic unwind.
pub struct TerminalGuard;

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(io::stdout(), Show);
    }
}

/// Whether a key event means "quit": `q`, or Ctrl-C in raw mode.
pub fn is_quit_key(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Char('Q') => true,
        KeyCode::Char('c') | KeyCode::Char('C') => {
            key.modifiers.contains(KeyModifiers::CONTROL)
        }
        _ => false,
    }
}

/// Spawn the blocking key watcher thread.
///
/// Polls with a 100 ms timeout so it notices `stop` promptly. Sends one
/// [`ShutdownReason::QuitKey`] and exits when the quit key is pressed.
pub fn spawn_key_watcher(
    stop: Arc<AtomicBool>,
    notify: tokio::sync::mpsc::Sender<ShutdownReason>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if is_quit_key(&key) {
                            let _ = notify.blocking_send(ShutdownReason::QuitKey);
                            return;
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Key watcher poll failed, exiting");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_q_is_quit() {
        assert!(is_quit_key(&press(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit_key(&press(KeyCode::Char('Q'), KeyModifiers::SHIFT)));
    }

    #[test]
    fn test_ctrl_c_is_quit() {
        assert!(is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn test_plain_c_is_not_quit() {
        assert!(!is_quit_key(&press(KeyCode::Char('c'), KeyModifiers::NONE)));
    }

    #[test]
    fn test_other_keys_ignored() {
        assert!(!is_quit_key(&press(KeyCode::Char('x'), KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Enter, KeyModifiers::NONE)));
        assert!(!is_quit_key(&press(KeyCode::Esc, KeyModifiers::NONE)));
    }

    #[test]
    fn test_release_events_ignored() {
        let mut key = press(KeyCode::Char('q'), KeyModifiers::NONE);
        key.kind = KeyEventKind::Release;
        assert!(!is_quit_key(&key));
    }

    #[tokio::test]
    async fn test_watcher_exits_on_stop_flag() {
        let stop = Arc::new(AtomicBool::new(true));
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let handle = spawn_key_watcher(Arc::clone(&stop), tx);
        // Already-set stop flag: the thread must wind down on its own.
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
    }
}
