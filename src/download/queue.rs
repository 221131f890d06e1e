use crate::piece::PieceWork;
use async_channel::{Receiver, Sender, TrySendError};

/// What happened to an item handed back to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Queued,
    /// The queue was at capacity; the item is dropped rather than blocking the caller
    Full,
    /// The queue was closed after the download finished; the item is no longer needed
    Closed,
}

/// Bounded multi-producer/multi-consumer queue of outstanding pieces.
///
/// Every clone refers to the same queue. Each item is received by exactly one consumer.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<PieceWork>,
    rx: Receiver<PieceWork>,
}

impl WorkQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Pull the next item. Returns `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<PieceWork> {
        self.rx.recv().await.ok()
    }

    /// Non-blocking enqueue, used both for seeding and for handing back failed work
    pub fn requeue(&self, work: PieceWork) -> Requeue {
        match self.tx.try_send(work) {
            Ok(()) => Requeue::Queued,
            Err(TrySendError::Full(_)) => Requeue::Full,
            Err(TrySendError::Closed(_)) => Requeue::Closed,
        }
    }

    /// Close the queue; pending `next` calls return once it drains
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
