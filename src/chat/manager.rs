//! Connection manager and message broadcaster.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ChatManager                          │
//! │                                                             │
//! │   ┌────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │   │ IrcAdapter │   │ PollAdapter │   │ClientAdapter│  ...   │
//! │   └─────┬──────┘   └──────┬──────┘   └──────┬──────┘        │
//! │         │                 │                 │               │
//! │         └────────┬────────┴─────────────────┘               │
//! │                  ▼                                          │
//! │        per-source dedup → listener fan-out                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each source runs as an independently cancellable task. A source's
//! repeated failures degrade that source only; it retries on its own
//! schedule and never takes down the manager or its siblings.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chat::client::ClientAdapter;
use crate::chat::irc::IrcAdapter;
use crate::chat::message::ChatMessage;
use crate::chat::poll::PollAdapter;
use crate::config::Config;
use crate::error::SourceError;
use crate::source::{AdapterKind, Source, select_adapter};

/// Handle returned by [`ChatManager::add_listener`], used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type ListenerFn = Arc<dyn Fn(ChatMessage) + Send + Sync>;

/// Registered message listeners.
///
/// Broadcast snapshots the list under a read lock, then invokes each
/// callback outside it; a panicking listener is isolated and logged, and
/// delivery continues to the rest.
pub(crate) struct ListenerRegistry {
    listeners: std::sync::RwLock<Vec<(ListenerId, ListenerFn)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            listeners: std::sync::RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, listener: ListenerFn) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push((id, listener));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub(crate) fn broadcast(&self, message: &ChatMessage) {
        let snapshot: Vec<(ListenerId, ListenerFn)> = self
            .listeners
            .read()
            .expect("listener lock poisoned")
            .clone();

        for (id, listener) in snapshot {
            let msg = message.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(|| listener(msg))).is_err() {
                tracing::error!(listener = id.0, "Message listener panicked; continuing");
            }
        }
    }

    fn len(&self) -> usize {
        self.listeners.read().expect("listener lock poisoned").len()
    }
}

/// Bounded set of already-delivered message ids for one source.
///
/// Once the set exceeds its cap it is cleared wholesale: bounded memory
/// traded for the chance of re-delivering an old message afterwards.
pub(crate) struct SeenIds {
    set: HashSet<String>,
    max: usize,
}

impl SeenIds {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            set: HashSet::new(),
            max,
        }
    }

    /// Record an id; returns `true` when the message should be emitted.
    /// Ids the source does not supply (empty) always pass.
    pub(crate) fn insert(&mut self, id: &str) -> bool {
        if id.is_empty() {
            return true;
        }
        if self.set.contains(id) {
            return false;
        }
        if self.set.len() >= self.max {
            tracing::debug!(cap = self.max, "Clearing seen-id set at cap");
            self.set.clear();
        }
        self.set.insert(id.to_string());
        true
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.set.len()
    }
}

/// Per-task context handed to an adapter: identity, dedup state, the
/// listener fan-out, and the shutdown signal.
pub struct AdapterContext {
    key: String,
    listeners: Arc<ListenerRegistry>,
    seen: SeenIds,
    shutdown: watch::Receiver<bool>,
    poll_interval: Duration,
}

impl AdapterContext {
    pub(crate) fn new(
        key: String,
        listeners: Arc<ListenerRegistry>,
        seen: SeenIds,
        shutdown: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            key,
            listeners,
            seen,
            shutdown,
            poll_interval,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Backoff applied after a transport error: one longer sleep.
    pub fn backoff_interval(&self) -> Duration {
        self.poll_interval * 2
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once shutdown has been signalled (immediately if it
    /// already was).
    pub async fn shutdown_changed(&mut self) {
        while !*self.shutdown.borrow() {
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep, waking early on shutdown. Returns `true` when shutdown was
    /// observed.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown_changed() => true,
        }
    }

    /// Sleep one backoff cycle. Returns `true` when shutdown was observed.
    pub async fn sleep_backoff(&mut self) -> bool {
        let backoff = self.backoff_interval();
        self.sleep(backoff).await
    }

    /// Dedup and fan a normalized message out to every listener.
    pub fn emit(&mut self, message: ChatMessage) {
        if !self.seen.insert(&message.message_id) {
            tracing::trace!(
                source = %self.key,
                id = %message.message_id,
                "Suppressing duplicate message"
            );
            return;
        }
        self.listeners.broadcast(&message);
    }
}

/// One running source: its task and the signal that stops it.
struct ActiveSource {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the set of active chat sources and fans normalized messages out
/// to registered listeners.
pub struct ChatManager {
    config: Config,
    listeners: Arc<ListenerRegistry>,
    active: tokio::sync::Mutex<HashMap<String, ActiveSource>>,
}

impl ChatManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            listeners: Arc::new(ListenerRegistry::new()),
            active: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register a message listener. Returns a handle for removal.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ChatMessage) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        tracing::info!("Added chat message listener");
        id
    }

    /// Remove a previously registered listener.
    pub fn remove_listener(&self, id: ListenerId) {
        if self.listeners.remove(id) {
            tracing::info!("Removed chat message listener");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Keys of all currently active sources.
    pub async fn active_sources(&self) -> Vec<String> {
        self.active.lock().await.keys().cloned().collect()
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.active.lock().await.contains_key(key)
    }

    /// Start a source. Idempotent per source identity: starting an
    /// already-active source is a warning no-op. An unrecognized source
    /// is a typed error and nothing starts.
    pub async fn start(&self, source: Source) -> Result<(), SourceError> {
        let key = source.key();
        let mut active = self.active.lock().await;
        if active.contains_key(&key) {
            tracing::warn!(source = %key, "Source already active, ignoring start");
            return Ok(());
        }

        let kind = select_adapter(&source)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = AdapterContext::new(
            key.clone(),
            Arc::clone(&self.listeners),
            SeenIds::new(self.config.seen_ids_max),
            shutdown_rx,
            self.config.poll_interval,
        );

        let task = match (kind, source) {
            (AdapterKind::TwitchIrc, Source::Url(url)) => {
                let adapter = IrcAdapter::new(&url)?;
                tokio::spawn(adapter.run(ctx))
            }
            (AdapterKind::HttpPoll(platform), Source::Url(url)) => {
                let adapter = PollAdapter::new(url, platform);
                tokio::spawn(adapter.run(ctx))
            }
            (AdapterKind::ClientPoll, Source::Client { handle, .. }) => {
                let adapter = ClientAdapter::new(handle);
                tokio::spawn(adapter.run(ctx))
            }
            // select_adapter pairs kinds with variants; this arm is
            // unreachable but cheap to keep total.
            (_, source) => {
                return Err(SourceError::UnsupportedPlatform { key: source.key() });
            }
        };

        tracing::info!(source = %key, "Started chat source");
        active.insert(key, ActiveSource {
            shutdown: shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop every active source: signal each task, await its exit (the
    /// adapters close their transports on the way out), and clear all
    /// tracking state. Safe to call when nothing is running.
    pub async fn stop(&self) {
        let drained: Vec<(String, ActiveSource)> =
            self.active.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        for (key, source) in drained {
            let _ = source.shutdown.send(true);
            match source.task.await {
                Ok(()) => tracing::info!(source = %key, "Source stopped"),
                Err(e) if e.is_cancelled() => {
                    tracing::info!(source = %key, "Source task cancelled")
                }
                Err(e) => tracing::error!(source = %key, error = %e, "Source task panicked"),
            }
        }
        tracing::info!("Stopped chat polling");
    }
}
