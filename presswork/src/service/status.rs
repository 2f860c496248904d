use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PublishResult;
use crate::store::StatusStore;
use crate::types::{ItemStatus, JobId};

/// Batches item status rows before handing them to the status store.
///
/// Rows buffer per job and are flushed when the buffer crosses the batch
/// size or explicitly at job end. This bounds write amplification without
/// unbounded buffering, and keeps dispatch workers from blocking on a
/// store write per item.
#[derive(Debug)]
pub struct StatusBatcher<S> {
    store: S,
    max_batch: usize,
    pending: Arc<Mutex<HashMap<JobId, Vec<ItemStatus>>>>,
}

impl<S: Clone> Clone for StatusBatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            max_batch: self.max_batch,
            pending: self.pending.clone(),
        }
    }
}

impl<S> StatusBatcher<S>
where
    S: StatusStore,
{
    pub fn new(store: S, max_batch: usize) -> Self {
        Self {
            store,
            max_batch,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Buffers one status row, flushing the job's buffer when it crosses
    /// the batch size.
    pub async fn push(&self, status: ItemStatus) -> PublishResult<()> {
        let batch = {
            let mut pending = self.pending.lock().await;
            let buffer = pending.entry(status.job_id).or_default();
            buffer.push(status);

            if buffer.len() >= self.max_batch {
                Some(std::mem::take(buffer))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            debug!(batch = batch.len(), "flushing status batch");
            self.store.persist(batch).await?;
        }

        Ok(())
    }

    /// Flushes everything buffered for one job, called at job end.
    pub async fn flush(&self, job_id: JobId) -> PublishResult<()> {
        let batch = {
            let mut pending = self.pending.lock().await;
            pending.remove(&job_id).unwrap_or_default()
        };

        if !batch.is_empty() {
            self.store.persist(batch).await?;
        }

        Ok(())
    }

    /// Flushes all buffered rows, called at service shutdown.
    pub async fn flush_all(&self) -> PublishResult<()> {
        let buffers: Vec<Vec<ItemStatus>> = {
            let mut pending = self.pending.lock().await;
            pending.drain().map(|(_, buffer)| buffer).collect()
        };

        for batch in buffers {
            if !batch.is_empty() {
                self.store.persist(batch).await?;
            }
        }

        Ok(())
    }
}
