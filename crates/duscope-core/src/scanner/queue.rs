/// Bounded hand-off between scan workers and a single collector thread.
///
/// Producers use [`QueueSender::push`], which waits at most the configured
/// timeout for room and then drops the item, counting the drop. A slow
/// collector therefore degrades the top-K lists instead of stalling the
/// worker pool. Totals never travel through this queue.
use crate::analysis::TopK;
use crate::model::HasSize;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct QueueSender<T> {
    tx: Sender<T>,
    timeout: Duration,
    dropped: Arc<AtomicU64>,
}

// Manual impl: a derive would require `T: Clone`.
impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            timeout: self.timeout,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

pub struct QueueReceiver<T> {
    rx: Receiver<T>,
}

/// Create a queue holding at most `capacity` items in flight.
pub fn bounded_queue<T>(capacity: usize, timeout: Duration) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        QueueSender {
            tx,
            timeout,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        QueueReceiver { rx },
    )
}

impl<T> QueueSender<T> {
    /// Offer an item. Returns `false` if it was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.send_timeout(item, self.timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Items dropped so far across all clones of this sender.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> QueueReceiver<T> {
    /// Block until every sender is gone, keeping the `capacity` largest items.
    pub fn collect_top(self, capacity: usize) -> Vec<T>
    where
        T: HasSize,
    {
        let mut top = TopK::new(capacity);
        for item in self.rx.iter() {
            top.push(item);
        }
        top.into_sorted_desc()
    }
}
