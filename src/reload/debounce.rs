//! Trailing-edge debounce timer.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Handle to a running debounce task.
///
/// Every [`Debouncer::trigger`] (re)arms a single timer. The callback runs
/// once the timer expires with no further triggers. Dropping the handle
/// stops the task without firing a pending timer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    pub fn spawn<F>(window: Duration, mut on_fire: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let timer = tokio::time::sleep(window);
                tokio::pin!(timer);
                loop {
                    tokio::select! {
                        _ = &mut timer => {
                            on_fire();
                            break;
                        }
                        event = rx.recv() => match event {
                            Some(()) => timer.as_mut().reset(Instant::now() + window),
                            None => return,
                        },
                    }
                }
            }
        });

        Self { tx }
    }

    /// Safe to call from non-async threads such as the notify callback.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}
