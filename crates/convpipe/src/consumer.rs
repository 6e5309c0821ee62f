//! Ingestion consumers: one task per record type, draining its queue into
//! the repository.
//!
//! A consumer stops cleanly when its queue is closed and empty. On
//! cancellation it stops at once and discards whatever is still queued.
//! A record whose create is already in flight is allowed to finish.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use convpipe_core::{Record, RecordKind};
use convpipe_store::Repository;

use crate::queue::QueueReceiver;
use crate::shutdown::ShutdownListener;

/// Why a consumer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerExit {
    /// The queue was closed and every item was handed to the repository.
    Drained,
    /// Cancellation fired; `dropped` queued items were discarded.
    Cancelled { dropped: usize },
}

/// Outcome of one consumer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    pub kind: RecordKind,
    /// Records the repository accepted.
    pub stored: usize,
    /// Records the repository rejected with an error.
    pub failed: usize,
    pub exit: ConsumerExit,
}

/// Drain `queue` into `repo` until the queue ends or `shutdown` fires.
pub async fn run_consumer<T: Record>(
    mut queue: QueueReceiver<T>,
    repo: Arc<dyn Repository<T>>,
    mut shutdown: ShutdownListener,
) -> ConsumerReport {
    let kind = T::KIND;
    let mut stored = 0;
    let mut failed = 0;

    let exit = loop {
        let item = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                let dropped = queue.discard();
                if dropped > 0 {
                    warn!(%kind, dropped, "consumer cancelled, discarding queued records");
                }
                break ConsumerExit::Cancelled { dropped };
            }
            item = queue.recv() => item,
        };

        let Some(record) = item else {
            break ConsumerExit::Drained;
        };

        match repo.create(record).await {
            Ok(created) => {
                stored += 1;
                debug!(%kind, id = %created.id(), "record stored");
            }
            Err(e) => {
                failed += 1;
                error!(%kind, error = %e, "failed to store record");
            }
        }
    };

    info!(%kind, stored, failed, ?exit, "consumer finished");
    ConsumerReport {
        kind,
        stored,
        failed,
        exit,
    }
}

/// Spawn [`run_consumer`] on the runtime.
pub fn spawn_consumer<T: Record>(
    queue: QueueReceiver<T>,
    repo: Arc<dyn Repository<T>>,
    shutdown: ShutdownListener,
) -> JoinHandle<ConsumerReport> {
    tokio::spawn(run_consumer(queue, repo, shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use convpipe_core::ConversionRequest;
    use convpipe_store::MemoryRepository;

    use crate::queue::bounded;
    use crate::shutdown::Shutdown;

    fn request(amount: f64) -> ConversionRequest {
        ConversionRequest::new("USD", "EUR", amount)
    }

    #[tokio::test]
    async fn test_drains_closed_queue() {
        let repo = Arc::new(MemoryRepository::<ConversionRequest>::new());
        let (tx, rx) = bounded(RecordKind::Request, 8);
        let status = tx.status();
        let shutdown = Shutdown::new();

        for i in 0..5 {
            tx.send(request(f64::from(i + 1))).await.unwrap();
        }
        tx.close();

        let report = spawn_consumer(rx, repo.clone(), shutdown.subscribe())
            .await
            .unwrap();

        assert_eq!(report.stored, 5);
        assert_eq!(report.exit, ConsumerExit::Drained);
        assert!(status.is_drained());

        let amounts: Vec<f64> = repo.get_all().await.unwrap().iter().map(|r| r.amount).collect();
        assert_eq!(amounts, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn test_cancel_discards_backlog() {
        let repo = Arc::new(MemoryRepository::<ConversionRequest>::new());
        let (tx, rx) = bounded(RecordKind::Request, 8);
        let shutdown = Shutdown::new();

        for i in 0..5 {
            tx.send(request(f64::from(i + 1))).await.unwrap();
        }
        shutdown.trigger("test");

        let report = spawn_consumer(rx, repo.clone(), shutdown.subscribe())
            .await
            .unwrap();

        assert_eq!(report.exit, ConsumerExit::Cancelled { dropped: 5 });
        assert_eq!(report.stored, 0);
        assert!(repo.is_empty());
        assert!(tx.send(request(9.0)).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let repo = Arc::new(MemoryRepository::<ConversionRequest>::new());
        let (tx, rx) = bounded::<ConversionRequest>(RecordKind::Request, 8);
        let shutdown = Shutdown::new();

        let handle = spawn_consumer(rx, repo, shutdown.subscribe());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger("test");

        let report = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.exit, ConsumerExit::Cancelled { dropped: 0 });
        drop(tx);
    }

    #[tokio::test]
    async fn test_repository_errors_are_counted_not_fatal() {
        let repo = Arc::new(MemoryRepository::<ConversionRequest>::new());
        repo.set_fail_writes(true);
        let (tx, rx) = bounded(RecordKind::Request, 8);
        let shutdown = Shutdown::new();

        tx.send(request(1.0)).await.unwrap();
        tx.send(request(2.0)).await.unwrap();
        tx.close();

        let report = spawn_consumer(rx, repo.clone(), shutdown.subscribe())
            .await
            .unwrap();
        assert_eq!(report.failed, 2);
        assert_eq!(report.stored, 0);
        assert_eq!(report.exit, ConsumerExit::Drained);
    }
}
