//! Background retries for invalidations that failed after a commit.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use tasktrack_core::lock::BackoffPolicy;

use super::{CacheCoherencyManager, Invalidation};

/// Sending half of the retry worker, cheap to clone into pipelines.
#[derive(Clone)]
pub struct InvalidationQueue {
    tx: mpsc::UnboundedSender<Invalidation>,
}

impl InvalidationQueue {
    /// Queues an invalidation. Returns false if the worker has stopped.
    pub fn enqueue(&self, invalidation: Invalidation) -> bool {
        self.tx.send(invalidation).is_ok()
    }
}

/// Worker that replays failed invalidations with backoff.
///
/// Each queued invalidation is retried independently. Exhausted retries are
/// logged and left to TTL expiry.
pub struct InvalidationRetrier {
    queue: InvalidationQueue,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl InvalidationRetrier {
    /// Spawns the worker on the current runtime.
    pub fn spawn(manager: Arc<CacheCoherencyManager>, policy: BackoffPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(manager, policy, rx, shutdown_rx));

        Self {
            queue: InvalidationQueue { tx },
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub fn queue(&self) -> InvalidationQueue {
        self.queue.clone()
    }

    /// Stops accepting work and waits for queued retries to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "Invalidation retry worker panicked");
        }
    }
}

async fn run(
    manager: Arc<CacheCoherencyManager>,
    policy: BackoffPolicy,
    mut rx: mpsc::UnboundedReceiver<Invalidation>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut retries = JoinSet::new();

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(invalidation) => {
                    retries.spawn(retry(manager.clone(), policy, invalidation));
                }
                None => break,
            },
            Some(_) = retries.join_next(), if !retries.is_empty() => {}
            _ = &mut shutdown_rx => {
                rx.close();
                while let Some(invalidation) = rx.recv().await {
                    retries.spawn(retry(manager.clone(), policy, invalidation));
                }
                break;
            }
        }
    }

    while retries.join_next().await.is_some() {}
    tracing::debug!("Invalidation retry worker stopped");
}

async fn retry(manager: Arc<CacheCoherencyManager>, policy: BackoffPolicy, invalidation: Invalidation) {
    let mut attempts = 0;

    while policy.should_retry(attempts) {
        tokio::time::sleep(policy.delay_for(attempts)).await;
        attempts += 1;

        match manager.apply(&invalidation).await {
            Ok(()) => {
                tracing::debug!(?invalidation, attempts, "Retried invalidation succeeded");
                return;
            }
            Err(err) if !err.is_transient() => {
                tracing::warn!(
                    ?invalidation,
                    attempts,
                    error = %err,
                    "Invalidation failed permanently, entry will expire with its TTL"
                );
                return;
            }
            Err(err) => {
                tracing::debug!(?invalidation, attempts, error = %err, "Invalidation retry failed");
            }
        }
    }

    tracing::warn!(
        ?invalidation,
        attempts,
        "Giving up on invalidation, entry will expire with its TTL"
    );
}
