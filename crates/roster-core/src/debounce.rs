//! Trailing-edge debouncer
//!
//! Values scheduled within `delay` of each other collapse into a single
//! call with the latest value. Dropping the debouncer flushes the pending
//! value instead of discarding it.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

/// Debounced async sink
#[derive(Debug)]
pub struct Debouncer<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Spawn the debounce task. Must be called inside a tokio runtime.
    pub fn new<F, Fut>(name: &'static str, delay: Duration, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(name, rx, delay, handler));
        Self { name, tx }
    }

    /// Replace the pending value and restart the delay
    pub fn schedule(&self, value: T) {
        if self.tx.send(value).is_err() {
            tracing::debug!(debouncer = self.name, "debounce task gone, value dropped");
        }
    }
}

async fn run<T, F, Fut>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<T>,
    delay: Duration,
    handler: F,
) where
    F: Fn(T) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(mut pending) = rx.recv().await {
        loop {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(value) => pending = value,
                    None => {
                        tracing::trace!(debouncer = name, "flushing on close");
                        handler(pending).await;
                        return;
                    }
                },
                () = tokio::time::sleep(delay) => {
                    handler(pending).await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> std::future::Ready<()> + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v| {
            sink.lock().push(v);
            std::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_latest() {
        let (seen, handler) = recorder();
        let debouncer = Debouncer::new("test", Duration::from_secs(5), handler);

        debouncer.schedule(1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        debouncer.schedule(2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        debouncer.schedule(3);
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(*seen.lock(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_flushes_pending() {
        let (seen, handler) = recorder();
        let debouncer = Debouncer::new("test", Duration::from_secs(5), handler);
        debouncer.schedule(7);
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*seen.lock(), vec![7]);
    }
}
