//! Two-stage resolution of segment root IDs against a versioned annotation
//! service.
//!
//! A run parses a list of identifiers, looks each one up concurrently through
//! a bounded [`LookupPool`] (Stage 1), resolves the collected keys with
//! sequential bulk calls through a [`BatchResolver`] (Stage 2), and merges
//! both stages into one classified result per input line with a
//! [`ResultAssembler`]. [`Pipeline`] drives the whole thing.
//!
//! The remote side sits behind [`AnnotationService`], so the pipeline itself
//! never touches the network.

mod assemble;
mod batch;
mod error;
mod pipeline;
pub mod pool;
mod record;
mod service;
mod types;

pub use crate::assemble::*;
pub use crate::batch::*;
pub use crate::error::*;
pub use crate::pipeline::*;
pub use crate::pool::{DEFAULT_WORKERS, LookupOutcome, LookupPool};
pub use crate::record::*;
pub use crate::service::*;
pub use crate::types::*;
