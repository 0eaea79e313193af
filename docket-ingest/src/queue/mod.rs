//! Upload queue
//!
//! Ordered list of files awaiting submission for one collection.
//! Queue position is commitment order: new tasks append at the tail,
//! and `resolve_head` is the only operation that removes anything.

pub mod guard;

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::RwLock;

pub use guard::{SubmitGuard, SubmitPermit};

/// One file staged for upload.
///
/// Identity is queue position; tasks carry no separate id. A task is
/// consumed when its submission succeeds or unrecoverably fails, and is
/// never mutated in place.
#[derive(Debug, Clone)]
pub struct UploadTask {
    /// Filename shown to the user and sent to the backend
    pub filename: String,

    /// Raw file contents
    pub payload: Bytes,

    /// Vision model the pipeline should run on extracted figures
    pub vision_model: String,
}

impl UploadTask {
    pub fn new(
        filename: impl Into<String>,
        payload: Bytes,
        vision_model: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            payload,
            vision_model: vision_model.into(),
        }
    }
}

/// FIFO store of pending uploads for one collection.
///
/// Interior locking so the orchestrator, its watcher task, and the
/// driving binary can share one instance.
#[derive(Debug, Default)]
pub struct UploadQueue {
    inner: RwLock<VecDeque<UploadTask>>,
}

impl UploadQueue {
    /// Create new empty upload queue
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a batch at the tail, preserving the caller's order.
    /// Returns the queue length after the append.
    pub async fn enqueue(&self, tasks: Vec<UploadTask>) -> usize {
        let mut queue = self.inner.write().await;
        queue.extend(tasks);
        queue.len()
    }

    /// Clone of the current head, if any. Does not remove.
    pub async fn peek_head(&self) -> Option<UploadTask> {
        self.inner.read().await.front().cloned()
    }

    /// Remove and return exactly the current head.
    ///
    /// The only removal primitive: submission success and unrecoverable
    /// failure both resolve the head, nothing else shrinks the queue.
    pub async fn resolve_head(&self) -> Option<UploadTask> {
        self.inner.write().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_task(name: &str) -> UploadTask {
        UploadTask::new(name, Bytes::from_static(b"%PDF-1.4"), "Moondream2")
    }

    #[tokio::test]
    async fn test_new_queue_is_empty() {
        let queue = UploadQueue::new();
        assert!(queue.is_empty().await);
        assert_eq!(queue.len().await, 0);
        assert!(queue.peek_head().await.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_preserves_batch_order() {
        let queue = UploadQueue::new();
        let len = queue
            .enqueue(vec![
                create_test_task("a.pdf"),
                create_test_task("b.docx"),
                create_test_task("c.pptx"),
            ])
            .await;
        assert_eq!(len, 3);

        assert_eq!(queue.peek_head().await.unwrap().filename, "a.pdf");
        queue.resolve_head().await;
        assert_eq!(queue.peek_head().await.unwrap().filename, "b.docx");
        queue.resolve_head().await;
        assert_eq!(queue.peek_head().await.unwrap().filename, "c.pptx");
    }

    #[tokio::test]
    async fn test_later_batches_append_behind_earlier_ones() {
        let queue = UploadQueue::new();
        queue.enqueue(vec![create_test_task("first.pdf")]).await;
        queue.enqueue(vec![create_test_task("second.pdf")]).await;

        assert_eq!(queue.resolve_head().await.unwrap().filename, "first.pdf");
        assert_eq!(queue.resolve_head().await.unwrap().filename, "second.pdf");
    }

    #[tokio::test]
    async fn test_peek_does_not_remove() {
        let queue = UploadQueue::new();
        queue.enqueue(vec![create_test_task("a.pdf")]).await;

        assert!(queue.peek_head().await.is_some());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_resolve_on_empty_returns_none() {
        let queue = UploadQueue::new();
        assert!(queue.resolve_head().await.is_none());
    }
}
