//! Per-port hot-reload state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use dashmap::DashMap;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::reload::debounce::Debouncer;
use crate::reload::watcher::ContentWatcher;

/// Payload of every reload event.
pub const RELOAD_MESSAGE: &str = "reload";

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

const SUBSCRIBER_BUFFER: usize = 4;

/// Subscribers, debounce timer and watched directories for one port.
pub struct HotReloadRegistry {
    port: u16,
    subscribers: DashMap<u64, mpsc::Sender<()>>,
    next_id: AtomicU64,
    debouncer: Debouncer,
    watched: Vec<PathBuf>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    closed: AtomicBool,
}

impl HotReloadRegistry {
    /// Create the registry. Directories are deduplicated; the watcher is
    /// not started until [`HotReloadRegistry::watch`].
    pub fn new<I>(port: u16, dirs: I) -> Arc<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let watched = dedupe_dirs(dirs);

        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let debouncer = Debouncer::spawn(DEBOUNCE_WINDOW, move || {
                if let Some(registry) = weak.upgrade() {
                    registry.broadcast();
                }
            });

            Self {
                port,
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(0),
                debouncer,
                watched,
                watcher: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn watched_dirs(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Start the recursive filesystem watcher over every watched directory.
    pub fn watch(&self) -> Result<(), notify::Error> {
        let debouncer = self.debouncer.clone();
        let watcher = ContentWatcher::new(self.watched.clone()).run(move || debouncer.trigger())?;

        if let Ok(mut slot) = self.watcher.lock() {
            *slot = Some(watcher);
        }
        tracing::info!(port = self.port, dirs = self.watched.len(), "Hot reload watching");
        Ok(())
    }

    /// Register a subscriber. `None` once the registry is closed.
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.insert(id, tx);
        tracing::debug!(port = self.port, id, "Hot reload subscriber connected");

        Some(Subscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        })
    }

    /// Record a filesystem change; restarts the debounce window.
    pub fn on_filesystem_event(&self) {
        if !self.closed.load(Ordering::Acquire) {
            self.debouncer.trigger();
        }
    }

    /// Deliver one reload notification to every subscriber.
    ///
    /// Subscribers whose stream has gone away are dropped. Returns the number
    /// of subscribers notified.
    pub fn broadcast(&self) -> usize {
        let mut delivered = 0;
        self.subscribers.retain(|id, tx| match tx.try_send(()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            // A reload is already queued for this subscriber
            Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!(port = self.port, id, "Dropping closed hot reload subscriber");
                false
            }
        });

        tracing::info!(port = self.port, subscribers = delivered, "Hot reload broadcast");
        metrics::record_reload_broadcast(self.port, delivered);
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Stop watching and end every open subscriber stream.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut slot) = self.watcher.lock() {
            slot.take();
        }
        self.subscribers.clear();
        tracing::debug!(port = self.port, "Hot reload registry closed");
    }

    fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            tracing::debug!(port = self.port, id, "Hot reload subscriber disconnected");
        }
    }
}

impl std::fmt::Debug for HotReloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadRegistry")
            .field("port", &self.port)
            .field("subscribers", &self.subscribers.len())
            .field("watched", &self.watched)
            .finish()
    }
}

/// One connected client. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<()>,
    registry: Weak<HotReloadRegistry>,
}

impl Subscription {
    /// Wait for the next reload. `None` when the registry closed.
    pub async fn next_reload(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

fn dedupe_dirs<I>(dirs: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut seen = BTreeSet::new();
    dirs.into_iter()
        .map(|dir| canonical_or_self(&dir))
        .filter(|dir| seen.insert(dir.clone()))
        .collect()
}

fn canonical_or_self(dir: &Path) -> PathBuf {
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deduplicates_watched_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a");
        std::fs::create_dir(&a).unwrap();
        let registry = HotReloadRegistry::new(
            8080,
            vec![a.clone(), a.join("."), tmp.path().to_path_buf()],
        );
        assert_eq!(registry.watched_dirs().len(), 2);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let registry = HotReloadRegistry::new(8080, Vec::new());
        let mut first = registry.subscribe().unwrap();
        let mut second = registry.subscribe().unwrap();

        assert_eq!(registry.broadcast(), 2);
        assert_eq!(first.next_reload().await, Some(()));
        assert_eq!(second.next_reload().await, Some(()));
    }

    #[tokio::test]
    async fn dropped_subscription_unsubscribes() {
        let registry = HotReloadRegistry::new(8080, Vec::new());
        let sub = registry.subscribe().unwrap();
        let _other = registry.subscribe().unwrap();
        assert_eq!(registry.subscriber_count(), 2);
        drop(sub);
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn closed_receiver_is_dropped_on_broadcast() {
        let registry = HotReloadRegistry::new(8080, Vec::new());
        let _alive = registry.subscribe().unwrap();
        // Simulate a subscriber whose stream went away without unsubscribing
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        registry.subscribers.insert(u64::MAX, tx);

        assert_eq!(registry.broadcast(), 1);
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn filesystem_burst_yields_one_notification() {
        let registry = HotReloadRegistry::new(8080, Vec::new());
        let mut sub = registry.subscribe().unwrap();

        for _ in 0..5 {
            registry.on_filesystem_event();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(sub.next_reload().await, Some(()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_new_subscribers() {
        let registry = HotReloadRegistry::new(8080, Vec::new());
        let mut sub = registry.subscribe().unwrap();
        registry.close();
        assert_eq!(sub.next_reload().await, None);
        assert!(registry.subscribe().is_none());
    }
}
