//! Bounded FIFO queues between the producer and the consumers.
//!
//! Each queue has exactly one sender and one receiver. Sending waits while
//! the queue is full. Closing consumes the sender, so nothing can be sent
//! after close. Dropping the sender closes the queue as well.
//!
//! A [`QueueStatus`] handle lets other tasks observe the queue lifecycle:
//! `Open` → `Closed` (producer is done) → `Drained` (consumer saw the end
//! after taking every buffered item).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use convpipe_core::RecordKind;

use crate::error::{PipelineError, Result};

/// Lifecycle of one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Open,
    Closed,
    Drained,
}

impl QueueState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => QueueState::Open,
            1 => QueueState::Closed,
            _ => QueueState::Drained,
        }
    }
}

/// Shared, read-mostly view of a queue's state.
#[derive(Debug, Clone)]
pub struct QueueStatus {
    kind: RecordKind,
    state: Arc<AtomicU8>,
}

impl QueueStatus {
    fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            state: Arc::new(AtomicU8::new(QueueState::Open as u8)),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The producer may still send.
    pub fn is_open(&self) -> bool {
        self.state() == QueueState::Open
    }

    pub fn is_drained(&self) -> bool {
        self.state() == QueueState::Drained
    }

    fn mark_closed(&self) -> bool {
        self.state
            .compare_exchange(
                QueueState::Open as u8,
                QueueState::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn mark_drained(&self) {
        self.state.store(QueueState::Drained as u8, Ordering::Release);
    }
}

/// Producer end of a queue.
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    status: QueueStatus,
}

impl<T> QueueSender<T> {
    /// Enqueue one item, waiting while the queue is full.
    ///
    /// Fails only when the consumer has stopped; the item is dropped.
    pub async fn send(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| PipelineError::QueueDisconnected(self.status.kind))
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self) -> QueueStatus {
        self.status.clone()
    }

    /// Close the queue after the last item. Buffered items stay readable.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        if self.status.mark_closed() {
            debug!(kind = %self.status.kind, buffered = self.len(), "queue closed");
        }
    }
}

/// Consumer end of a queue.
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    status: QueueStatus,
}

impl<T> QueueReceiver<T> {
    /// Next item, or `None` once the queue is closed and empty.
    pub async fn recv(&mut self) -> Option<T> {
        let item = self.rx.recv().await;
        if item.is_none() {
            self.status.mark_drained();
        }
        item
    }

    /// Stop accepting items and discard whatever is buffered.
    ///
    /// Returns how many items were discarded.
    pub fn discard(&mut self) -> usize {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }

    pub fn status(&self) -> QueueStatus {
        self.status.clone()
    }

    pub fn kind(&self) -> RecordKind {
        self.status.kind
    }
}

/// Create a bounded queue for one record kind.
///
/// `capacity` must be at least 1.
pub fn bounded<T>(kind: RecordKind, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let status = QueueStatus::new(kind);
    (
        QueueSender {
            tx,
            status: status.clone(),
        },
        QueueReceiver { rx, status },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_then_drained() {
        let (tx, mut rx) = bounded::<u32>(RecordKind::Request, 4);
        let status = tx.status();

        for i in 0..3 {
            tx.send(i).await.unwrap();
        }
        assert_eq!(tx.len(), 3);
        tx.close();
        assert_eq!(status.state(), QueueState::Closed);

        assert_eq!(rx.recv().await, Some(0));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(status.state(), QueueState::Closed);
        assert_eq!(rx.recv().await, None);
        assert_eq!(status.state(), QueueState::Drained);
    }

    #[tokio::test]
    async fn test_send_waits_when_full() {
        let (tx, mut rx) = bounded::<u32>(RecordKind::Log, 1);
        tx.send(1).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.send(2)).await;
        assert!(blocked.is_err(), "send must wait while the queue is full");

        assert_eq!(rx.recv().await, Some(1));
        tx.send(3).await.unwrap();
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_dropping_sender_closes() {
        let (tx, mut rx) = bounded::<u32>(RecordKind::Response, 2);
        let status = rx.status();
        drop(tx);
        assert!(!status.is_open());
        assert_eq!(rx.recv().await, None);
        assert!(status.is_drained());
    }

    #[tokio::test]
    async fn test_discard_disconnects_sender() {
        let (tx, mut rx) = bounded::<u32>(RecordKind::Request, 4);
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        assert_eq!(rx.discard(), 2);
        assert!(matches!(
            tx.send(3).await,
            Err(PipelineError::QueueDisconnected(RecordKind::Request))
        ));
    }
}
