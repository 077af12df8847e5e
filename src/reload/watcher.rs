//! Content directory watcher for hot reload.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// A watcher that monitors static content directories for changes.
pub struct ContentWatcher {
    dirs: Vec<PathBuf>,
}

impl ContentWatcher {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Start watching every directory recursively.
    ///
    /// `on_change` runs on the notify thread for every content change. The
    /// returned watcher stops when dropped. A directory that cannot be
    /// watched is logged and skipped.
    pub fn run<F>(self, on_change: F) -> Result<RecommendedWatcher, notify::Error>
    where
        F: Fn() + Send + 'static,
    {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_content_change(&event.kind) => {
                    tracing::debug!(paths = ?event.paths, "Content change detected");
                    on_change();
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for dir in &self.dirs {
            match watcher.watch(dir, RecursiveMode::Recursive) {
                Ok(()) => tracing::info!(path = ?dir, "Watching for changes"),
                Err(e) => tracing::warn!(path = ?dir, error = %e, "Cannot watch directory"),
            }
        }

        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    kind.is_create() || kind.is_modify() || kind.is_remove()
}
