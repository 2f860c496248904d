//! Shared configuration types for presswork publishing services.

pub mod shared;
