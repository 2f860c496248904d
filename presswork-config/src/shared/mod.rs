//! Shared configuration types for publishing jobs and services.

mod base;
mod batch;
mod job;
mod service;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use job::JobConfig;
pub use service::ServiceConfig;
