//! [`AnnotationService`](rootsync::AnnotationService) implementation for CAVE
//! datastacks.
//!
//! [`CaveClient::connect`] looks the datastack up in the info service once,
//! then talks to its chunkedgraph (leaf lookups and bulk root resolution) and
//! L2 cache (level-2 chunk coordinates).

mod client;
mod config;
mod info;
mod wire;

pub use crate::client::*;
pub use crate::config::*;
pub use crate::info::*;
