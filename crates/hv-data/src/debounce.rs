//! Trailing-edge debouncer for viewport events

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Coalesces bursts of values into a single call made after `delay` of quiet.
///
/// Each pushed value replaces the pending one and restarts the timer. The
/// callback runs on the debounce task, so it should hand long work off to
/// its own task. Dropping the debouncer stops the task.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
    shutdown: CancellationToken,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce task on the current runtime
    pub fn spawn<F>(delay: Duration, mut on_settled: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        tokio::spawn(async move {
            let mut pending: Option<T> = None;
            let mut timer: Option<Pin<Box<Sleep>>> = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    maybe = rx.recv() => {
                        let Some(value) = maybe else { break; };
                        if pending.replace(value).is_some() {
                            trace!("debounce: superseded pending value");
                        }
                        timer = Some(Box::pin(sleep(delay)));
                    }
                    _ = async {
                        if let Some(timer) = &mut timer {
                            timer.await;
                        }
                    }, if timer.is_some() => {
                        timer = None;
                        if let Some(value) = pending.take() {
                            on_settled(value);
                        }
                    }
                }
            }
        });

        Self { tx, shutdown }
    }

    /// Queue a value; returns false once the debouncer has shut down
    pub fn push(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }

    /// Stop the task, dropping any pending value
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
