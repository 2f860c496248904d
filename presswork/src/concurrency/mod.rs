//! Concurrency utilities coordinating the publishing pipeline.
//!
//! The engine runs one task per active job, a pool of dispatch workers
//! draining a shared queue, and a background demand monitor. These modules
//! provide the two coordination primitives they share: a broadcast shutdown
//! channel and a lightweight wakeup signal. Narrow critical sections
//! elsewhere protect specific invariants; no global lock serializes the
//! system.

pub mod shutdown;
pub mod signal;
