use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A numeric field holds a value outside its accepted range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: String,
        constraint: String,
    },
    /// The number of dispatch workers cannot be zero.
    #[error("`dispatch_workers` cannot be zero")]
    DispatchWorkersZero,
}
