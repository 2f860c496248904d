//! presswork — a publishing job engine.
//!
//! Takes a configured edition, expands its content lists into a stream of
//! publish/unpublish work items, dispatches them through a pool of
//! asynchronous workers that assemble and deliver each item, and drives
//! every job through an explicit state machine with cancellation, dual
//! timeouts and a commit handshake.
//!
//! The surrounding application provides the collaborators — catalog,
//! assembler, delivery manager, transport and stores — as implementations
//! of the narrow traits in the corresponding modules; in-memory
//! implementations live next to each trait.

pub mod assembly;
pub mod catalog;
pub mod concurrency;
pub mod delivery;
pub mod error;
pub mod job;
pub mod service;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;
pub mod workers;

mod macros;
