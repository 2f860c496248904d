use serde::{Deserialize, Serialize};

use crate::shared::{BatchConfig, ValidationError};

/// Configuration for a single publishing job run.
///
/// Contains the polling cadence of the working loop, the two timeout clocks
/// that guard against a stalled queue or a dead job, and the ceiling on the
/// commit handshake.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobConfig {
    /// Interval, in milliseconds, between working-loop polls of the item
    /// state counters.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum time, in milliseconds, the job tolerates without any inbound
    /// message for it being observed by a dispatch worker. Expiry cancels
    /// the job; this is the workaround for a stalled message broker.
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
    /// Maximum time, in milliseconds, the job tolerates without any item
    /// status update at all. Expiry cancels the job.
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,
    /// Maximum time, in milliseconds, to wait for the delivery layer to
    /// acknowledge the job-end commit.
    #[serde(default = "default_commit_timeout_ms")]
    pub commit_timeout_ms: u64,
    /// Batching configuration for queueing and status persistence.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl JobConfig {
    /// Default working-loop poll interval.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

    /// Default queue heartbeat timeout (10 minutes).
    pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 600_000;

    /// Default absolute job timeout (1 hour).
    pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 3_600_000;

    /// Default commit acknowledgment ceiling (2 hours).
    pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 7_200_000;

    /// Validates job configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.batch.validate()?;

        for (field, value) in [
            ("job.poll_interval_ms", self.poll_interval_ms),
            ("job.queue_timeout_ms", self.queue_timeout_ms),
            ("job.job_timeout_ms", self.job_timeout_ms),
            ("job.commit_timeout_ms", self.commit_timeout_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            queue_timeout_ms: default_queue_timeout_ms(),
            job_timeout_ms: default_job_timeout_ms(),
            commit_timeout_ms: default_commit_timeout_ms(),
            batch: BatchConfig::default(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    JobConfig::DEFAULT_POLL_INTERVAL_MS
}

fn default_queue_timeout_ms() -> u64 {
    JobConfig::DEFAULT_QUEUE_TIMEOUT_MS
}

fn default_job_timeout_ms() -> u64 {
    JobConfig::DEFAULT_JOB_TIMEOUT_MS
}

fn default_commit_timeout_ms() -> u64 {
    JobConfig::DEFAULT_COMMIT_TIMEOUT_MS
}
