use std::future::Future;

use crate::error::PublishResult;
use crate::types::{Priority, PublishMessage};

/// An ordered, at-least-once, priority-capable message transport.
///
/// Messages of equal priority are received in send order; higher priority
/// messages overtake lower ones, which is how a cancellation gets ahead of
/// a backlog of queued work. Delivery is at-least-once: consumers must
/// tolerate duplicates, which the monotonic item state tracker does.
pub trait Transport {
    /// Enqueues a message at the given priority.
    fn send(
        &self,
        message: PublishMessage,
        priority: Priority,
    ) -> impl Future<Output = PublishResult<()>> + Send;

    /// Receives the next message, blocking until one is available.
    ///
    /// Returns [`None`] once the transport is closed and drained. Multiple
    /// workers may call this concurrently; each message is handed to
    /// exactly one of them.
    fn recv(&self) -> impl Future<Output = Option<PublishMessage>> + Send;

    /// Closes the transport. Queued messages are still delivered; after
    /// the queue drains, `recv` returns [`None`].
    fn close(&self);
}
