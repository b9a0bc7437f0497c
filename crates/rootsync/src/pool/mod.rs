//! Stage 1: parallel per-record lookups.
//!
//! ## Structure
//!
//! - [`manager`] - [`LookupPool`], which owns the workers and drives a run.
//! - `worker` - the worker task loop.
//! - `request` - messages on the work queue and the per-record tickets.
//! - [`outcome`] - [`LookupOutcome`], the per-record result.

pub mod manager;
pub mod outcome;
pub(crate) mod request;
pub(crate) mod worker;

pub use manager::{DEFAULT_WORKERS, LookupPool};
pub use outcome::LookupOutcome;
