use serde::{Deserialize, Serialize};

use crate::shared::{JobConfig, ValidationError};

/// Configuration for the publisher service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServiceConfig {
    /// Number of dispatch workers draining the outbound work queue.
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: u16,
    /// Retention, in milliseconds, of completed jobs in the registry before
    /// they are reaped.
    #[serde(default = "default_reap_after_ms")]
    pub reap_after_ms: u64,
    /// Poll interval, in milliseconds, of the demand-publish monitor when no
    /// wakeup signal arrives.
    #[serde(default = "default_demand_poll_ms")]
    pub demand_poll_ms: u64,
    /// Time, in milliseconds, a cancellation stays on the dispatchers'
    /// cancellation list before it is purged.
    #[serde(default = "default_cancellation_ttl_ms")]
    pub cancellation_ttl_ms: u64,
    /// Per-job run configuration.
    #[serde(default)]
    pub job: JobConfig,
}

impl ServiceConfig {
    /// Default number of dispatch workers.
    pub const DEFAULT_DISPATCH_WORKERS: u16 = 4;

    /// Default registry retention for completed jobs (30 minutes).
    pub const DEFAULT_REAP_AFTER_MS: u64 = 1_800_000;

    /// Default demand monitor poll interval (10 seconds).
    pub const DEFAULT_DEMAND_POLL_MS: u64 = 10_000;

    /// Default cancellation list retention (30 minutes).
    pub const DEFAULT_CANCELLATION_TTL_MS: u64 = 1_800_000;

    /// Validates service configuration settings.
    ///
    /// Checks the nested job settings and ensures worker count is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.job.validate()?;

        if self.dispatch_workers == 0 {
            return Err(ValidationError::DispatchWorkersZero);
        }

        for (field, value) in [
            ("reap_after_ms", self.reap_after_ms),
            ("demand_poll_ms", self.demand_poll_ms),
            ("cancellation_ttl_ms", self.cancellation_ttl_ms),
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

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: default_dispatch_workers(),
            reap_after_ms: default_reap_after_ms(),
            demand_poll_ms: default_demand_poll_ms(),
            cancellation_ttl_ms: default_cancellation_ttl_ms(),
            job: JobConfig::default(),
        }
    }
}

fn default_dispatch_workers() -> u16 {
    ServiceConfig::DEFAULT_DISPATCH_WORKERS
}

fn default_reap_after_ms() -> u64 {
    ServiceConfig::DEFAULT_REAP_AFTER_MS
}

fn default_demand_poll_ms() -> u64 {
    ServiceConfig::DEFAULT_DEMAND_POLL_MS
}

fn default_cancellation_ttl_ms() -> u64 {
    ServiceConfig::DEFAULT_CANCELLATION_TTL_MS
}
