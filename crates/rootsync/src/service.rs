//! The remote service seam.
//!
//! The pipeline never talks HTTP itself. It drives an [`AnnotationService`],
//! which is constructed once per run and shared by every worker behind an
//! `Arc`. Implementations must be safe for concurrent use and keep no
//! per-call mutable state.

use crate::{
    error::{LookupErrorKind, ServiceError},
    types::{LeafId, LeafLayer, NmCoord, Resolution, RootId},
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only operations of a versioned annotation service.
#[async_trait]
pub trait AnnotationService: Send + Sync {
    /// Returns one leaf of `id` at `layer`, or `None` if the segment has no
    /// leaves at that layer.
    async fn lookup_one(
        &self,
        id: RootId,
        layer: LeafLayer,
    ) -> Result<Option<LeafId>, LookupErrorKind>;

    /// Returns the current root of every supervoxel in `keys`.
    ///
    /// A response that does not cover every key is treated by the caller as a
    /// failure of the whole call.
    async fn bulk_resolve(&self, keys: &[LeafId]) -> Result<HashMap<LeafId, RootId>, ServiceError>;

    /// Returns the representative coordinate (nanometers) of every level-2
    /// chunk in `keys`. Same all-or-nothing contract as
    /// [`bulk_resolve`](Self::bulk_resolve).
    async fn bulk_coordinate_fetch(
        &self,
        keys: &[LeafId],
    ) -> Result<HashMap<LeafId, NmCoord>, ServiceError>;

    /// The datastack's voxel resolution.
    async fn resolution_vector(&self) -> Result<Resolution, ServiceError>;
}

