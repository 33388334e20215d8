use crate::models::UploadDescriptor;
use crate::services::transfer::TransferState;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A descriptor admitted to the work queue, carrying its progress tag and
/// how many attempts it has been through.
#[derive(Debug)]
pub struct QueueEntry {
    pub descriptor: UploadDescriptor,
    pub state: TransferState,
    pub attempts: u32,
}

impl QueueEntry {
    pub fn new(descriptor: UploadDescriptor) -> Self {
        Self {
            descriptor,
            state: TransferState::Pending,
            attempts: 0,
        }
    }
}

/// Unbounded FIFO queue shared by intake, recovery, retries and the
/// dispatcher.
///
/// `len` counts an entry from admission until the dispatcher has secured a
/// concurrency slot for it, so the drain operation never observes "empty"
/// while an item sits between pop and hand-off.
pub struct WorkQueue {
    tx: UnboundedSender<QueueEntry>,
    rx: Mutex<UnboundedReceiver<QueueEntry>>,
    len: AtomicUsize,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    /// Append an entry. Admission order is strictly FIFO.
    pub fn push(&self, entry: QueueEntry) {
        self.len.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(entry).is_err() {
            // the receiver lives as long as the queue itself
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Pop the next entry, waiting until one is available. Only the
    /// dispatcher calls this.
    pub async fn recv(&self) -> QueueEntry {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(entry) => entry,
            // unreachable: the queue owns a sender for its whole lifetime
            None => std::future::pending().await,
        }
    }

    /// The popped entry now holds its concurrency slot; stop counting it.
    pub fn mark_dispatched(&self) {
        self.len.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::SeqCst) == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadId;

    fn entry(path: &str) -> QueueEntry {
        QueueEntry::new(UploadDescriptor {
            id: UploadId::generate(),
            path: path.to_string(),
            parent_id: String::new(),
            length: 1,
            overwrite: false,
        })
    }

    #[tokio::test]
    async fn pops_in_admission_order() {
        let queue = WorkQueue::new();
        queue.push(entry("a"));
        queue.push(entry("b"));
        queue.push(entry("c"));

        assert_eq!(queue.recv().await.descriptor.path, "a");
        assert_eq!(queue.recv().await.descriptor.path, "b");
        assert_eq!(queue.recv().await.descriptor.path, "c");
    }

    #[tokio::test]
    async fn length_tracks_admission_to_dispatch() {
        let queue = WorkQueue::new();
        assert!(queue.is_empty());

        queue.push(entry("a"));
        assert!(!queue.is_empty());

        let _popped = queue.recv().await;
        // still counted until the dispatcher holds a slot for it
        assert!(!queue.is_empty());

        queue.mark_dispatched();
        assert!(queue.is_empty());
    }
}
