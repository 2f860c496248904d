//! Simple signaling primitives for worker coordination.
//!
//! Abstracts tokio's watch channels into signal types focused on
//! coordination events rather than data transfer. The demand monitor uses
//! one to wake up when new demand work is enqueued without polling.

use tokio::sync::watch;

/// Transmitter side of a coordination signal channel.
pub type SignalTx = watch::Sender<()>;

/// Receiver side of a coordination signal channel.
pub type SignalRx = watch::Receiver<()>;

/// Creates a new coordination signal channel.
///
/// Watch-based so that multiple receivers observe the same event; a signal
/// sent while nobody is waiting is still seen by the next `changed` call.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(());
    (tx, rx)
}
