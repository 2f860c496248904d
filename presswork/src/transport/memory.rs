use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use crate::bail;
use crate::error::{ErrorKind, PublishResult};
use crate::transport::base::Transport;
use crate::types::{Priority, PublishMessage};

/// A queued message with its ordering metadata.
struct Queued {
    priority: Priority,
    seq: u64,
    message: PublishMessage,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence number so
        // equal-priority messages keep send order.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    queue: Mutex<BinaryHeap<Queued>>,
    /// One permit per queued message; receivers block on it.
    available: Semaphore,
    seq: AtomicU64,
    closed: AtomicBool,
}

/// In-memory priority transport.
///
/// Backed by a priority heap drained through a semaphore so any number of
/// dispatch workers can block on `recv` concurrently, each message going
/// to exactly one of them.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(BinaryHeap::new()),
                available: Semaphore::new(0),
                seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn pop(&self) -> Option<PublishMessage> {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.pop().map(|queued| queued.message)
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, message: PublishMessage, priority: Priority) -> PublishResult<()> {
        if self.inner.closed.load(AtomicOrdering::Acquire) {
            bail!(
                ErrorKind::TransportClosed,
                "Transport is closed",
                format!("dropping message for job {}", message.job_id())
            );
        }

        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.push(Queued {
                priority,
                seq,
                message,
            });
        }
        self.inner.available.add_permits(1);

        Ok(())
    }

    async fn recv(&self) -> Option<PublishMessage> {
        match self.inner.available.acquire().await {
            Ok(permit) => {
                permit.forget();
                self.pop()
            }
            // Closed: drain whatever is left, then report end of stream.
            Err(_) => self.pop(),
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, AtomicOrdering::Release);
        self.inner.available.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CancelMessage, JobControlMessage};

    fn control(job_id: u64) -> PublishMessage {
        PublishMessage::JobControl(JobControlMessage::End { job_id })
    }

    #[tokio::test]
    async fn equal_priority_preserves_send_order() {
        let transport = MemoryTransport::new();
        transport.send(control(1), Priority::Normal).await.unwrap();
        transport.send(control(2), Priority::Normal).await.unwrap();
        transport.send(control(3), Priority::Normal).await.unwrap();

        for expected in 1..=3u64 {
            let message = transport.recv().await.unwrap();
            assert_eq!(message.job_id(), expected);
        }
    }

    #[tokio::test]
    async fn high_priority_overtakes_queued_work() {
        let transport = MemoryTransport::new();
        transport.send(control(1), Priority::Normal).await.unwrap();
        transport.send(control(2), Priority::Normal).await.unwrap();
        transport
            .send(
                PublishMessage::Cancel(CancelMessage {
                    job_id: 9,
                    by_user: true,
                }),
                Priority::High,
            )
            .await
            .unwrap();

        let first = transport.recv().await.unwrap();
        assert!(matches!(first, PublishMessage::Cancel(_)));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let transport = MemoryTransport::new();
        transport.send(control(1), Priority::Normal).await.unwrap();
        transport.close();

        assert!(transport.recv().await.is_some());
        assert!(transport.recv().await.is_none());
        assert!(
            transport
                .send(control(2), Priority::Normal)
                .await
                .is_err()
        );
    }
}
