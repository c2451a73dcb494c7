//! # defio-core: core types for the defio reactor
//!
//! This crate defines the boundary types the reactor, the future primitive
//! and the ring driver agree on. It knows nothing about io_uring; the
//! concrete driver lives in the `defio` crate behind the [`ring::RingDriver`]
//! trait.
//!
//! ## Modules
//!
//! - `job` - type-erased continuation + argument pairs
//! - `op` - typed submission descriptors
//! - `token` - completion tokens and completion entries
//! - `ring` - ring driver trait
//! - `error` - error types
//! - `dlog` - leveled stderr logging macros

pub mod dlog;
pub mod error;
pub mod job;
pub mod op;
pub mod ring;
pub mod token;

// Re-exports for convenience
pub use error::{DefioError, Result};
pub use job::Job;
pub use op::Submission;
pub use ring::RingDriver;
pub use token::{Completion, Token};
