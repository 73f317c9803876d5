//! Check-in audit trail delivery.
//!
//! Audit rows sit outside the consistency boundary of a check-in: the unit
//! is already marked by the time a row is written. Each row is delivered by
//! its own spawned task, so a caller that is cancelled mid-write still gets
//! its row. A row whose first write fails is queued and retried in the
//! background with exponential backoff, and is logged and dropped once the
//! retries run out.
//!
//! Every recorded row is also published on a broadcast channel for live
//! dashboards. Slow subscribers lag and skip rows; they never hold up a scan.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};
use turnstile_types::CheckinAttempt;

use crate::config::AuditConfig;
use crate::error::TicketResult;
use crate::store::AuditStore;

/// Writes audit rows and publishes them to dashboards.
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    retries: mpsc::Sender<CheckinAttempt>,
    feed: broadcast::Sender<CheckinAttempt>,
}

impl AuditRecorder {
    /// Create a recorder and spawn its retry task on the current runtime.
    ///
    /// The task exits once every clone of the recorder has been dropped and
    /// the queue has drained.
    pub fn spawn(store: Arc<dyn AuditStore>, config: &AuditConfig) -> Self {
        let (retries, queue) = mpsc::channel(config.queue_capacity.max(1));
        let (feed, _) = broadcast::channel(config.feed_capacity.max(1));
        tokio::spawn(retry_loop(
            Arc::clone(&store),
            queue,
            config.max_retries,
            config.initial_backoff(),
        ));
        Self {
            store,
            retries,
            feed,
        }
    }

    /// Write a row, falling back to the retry queue on failure.
    ///
    /// Delivery runs on a detached task; awaiting this only waits for the
    /// first write. Dropping the returned future does not cancel delivery.
    pub async fn record(&self, attempt: CheckinAttempt) {
        let recorder = self.clone();
        let delivery = tokio::spawn(async move { recorder.deliver(attempt).await });
        if let Err(err) = delivery.await {
            error!(%err, "Audit delivery task failed");
        }
    }

    async fn deliver(&self, attempt: CheckinAttempt) {
        match self.store.append(&attempt).await {
            Ok(()) => debug!(attempt_id = %attempt.id, outcome = ?attempt.outcome, "Audit row written"),
            Err(err) => {
                warn!(attempt_id = %attempt.id, %err, "Audit write failed, queueing retry");
                if let Err(full) = self.retries.try_send(attempt.clone()) {
                    let dropped = full.into_inner();
                    error!(
                        attempt_id = %dropped.id,
                        code = %dropped.code,
                        "Audit retry queue unavailable, row dropped"
                    );
                }
            }
        }
        // No subscribers is not an error.
        let _ = self.feed.send(attempt);
    }

    /// Rows recorded for a code, oldest first.
    pub async fn attempts_for_code(&self, code: &str) -> TicketResult<Vec<CheckinAttempt>> {
        self.store.attempts_for_code(code).await
    }

    /// Subscribe to the live stream of recorded rows.
    pub fn subscribe(&self) -> broadcast::Receiver<CheckinAttempt> {
        self.feed.subscribe()
    }
}

async fn retry_loop(
    store: Arc<dyn AuditStore>,
    mut queue: mpsc::Receiver<CheckinAttempt>,
    max_retries: u32,
    initial_backoff: Duration,
) {
    while let Some(attempt) = queue.recv().await {
        let mut delay = initial_backoff;
        let mut delivered = false;
        for retry in 1..=max_retries {
            tokio::time::sleep(delay).await;
            match store.append(&attempt).await {
                Ok(()) => {
                    debug!(attempt_id = %attempt.id, retry, "Audit row delivered on retry");
                    delivered = true;
                    break;
                }
                Err(err) => {
                    warn!(attempt_id = %attempt.id, retry, %err, "Audit retry failed");
                    delay = delay.saturating_mul(2);
                }
            }
        }
        if !delivered {
            error!(
                attempt_id = %attempt.id,
                code = %attempt.code,
                outcome = ?attempt.outcome,
                retries = max_retries,
                "Audit row dropped after retries"
            );
        }
    }
}
