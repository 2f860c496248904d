//! Broadcast shutdown channel for worker coordination.
//!
//! A single shutdown signal terminates the dispatch pool and the demand
//! monitor together. Workers keep a receiver and select on it at their
//! loop boundaries; they finish the message in hand before terminating.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

impl ShutdownTx {
    /// Signals shutdown to all subscribed workers.
    ///
    /// Fails when no receiver is alive anymore, which callers may safely
    /// ignore: it means every worker has already stopped.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<()>> {
        self.0.send(())
    }

    /// Creates a new receiver observing this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
///
/// The receiver returned here is usually dropped; workers subscribe off
/// the transmitter as they are spawned.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}
