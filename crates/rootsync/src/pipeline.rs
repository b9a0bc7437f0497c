//! The two-phase pipeline driver.
//!
//! [`Pipeline`] wires the stages together for one run:
//!
//! 1. Stage 1: [`LookupPool::lookup_all`] fans out one lookup per record and
//!    waits for every outcome.
//! 2. Stage 2: [`BatchResolver::resolve`] issues the bulk calls one group at a
//!    time. Grouping needs the complete key set, so this only starts once
//!    Stage 1 has fully drained.
//! 3. [`ResultAssembler`] restores input order and classifies every record.
//!
//! Per-record and per-group failures end up in the output. The only errors
//! returned from here are configuration-level ones.

use crate::{
    Result,
    assemble::{
        ClassificationPolicy, CoordinatePolicy, IdentityPolicy, ResolvedResult, ResultAssembler,
        StatusCounts,
    },
    batch::{BatchResolver, GroupReport, Resolutions},
    error::{Error, ServiceError},
    pool::{LookupOutcome, LookupPool},
    record::{ParseReport, ParseWarning},
    service::AnnotationService,
    types::{LeafId, LeafLayer, Resolution, RootId, VoxelCoord},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

/// Wall-clock time spent in each stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub lookup: Duration,
    pub batch: Duration,
    pub total: Duration,
}

/// Everything a run produced.
#[derive(Clone, Debug)]
pub struct Run<V> {
    /// One entry per parsed record, in input order.
    pub results: Vec<ResolvedResult<V>>,
    pub counts: StatusCounts,
    pub warnings: Vec<ParseWarning>,
    pub groups: Vec<GroupReport>,
    pub timings: StageTimings,
}

impl<V> Run<V> {
    pub fn failed_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.failure.is_some()).count()
    }
}

/// One run's worth of pool, resolver and service client.
pub struct Pipeline<S: ?Sized> {
    service: Arc<S>,
    pool: LookupPool,
    resolver: BatchResolver,
}

impl<S> Pipeline<S>
where
    S: AnnotationService + ?Sized + 'static,
{
    /// Builds the pipeline and spawns its lookup workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `workers` or `max_batch_size` is
    /// zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(service: Arc<S>, workers: usize, max_batch_size: usize) -> Result<Self> {
        let resolver = BatchResolver::new(max_batch_size)?;
        let pool = LookupPool::new(Arc::clone(&service), workers)?;
        Ok(Self {
            service,
            pool,
            resolver,
        })
    }

    pub const fn workers(&self) -> usize {
        self.pool.num_workers()
    }

    pub const fn max_batch_size(&self) -> usize {
        self.resolver.max_batch_size()
    }

    /// Identity resolution: finds the current root of every input identifier
    /// through one of its supervoxels.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(records = input.records.len())))]
    pub async fn validate(&self, input: ParseReport) -> Run<RootId> {
        let service = self.service.as_ref();
        self.run(
            input,
            LeafLayer::Supervoxel,
            IdentityPolicy,
            move |keys: Vec<LeafId>| async move { service.bulk_resolve(&keys).await },
        )
        .await
    }

    /// Coordinate lookup: finds a voxel coordinate inside every input segment
    /// through one of its level-2 chunks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the datastack's resolution vector
    /// cannot be fetched. This happens before any lookup is issued.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(records = input.records.len())))]
    pub async fn coordinates(&self, input: ParseReport) -> Result<Run<VoxelCoord>> {
        let resolution: Resolution =
            self.service
                .resolution_vector()
                .await
                .map_err(|e| Error::Configuration {
                    reason: format!("failed to fetch resolution vector: {e}"),
                })?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Viewer resolution: {} x {} x {} nm/voxel",
            resolution.x(),
            resolution.y(),
            resolution.z()
        );

        let service = self.service.as_ref();
        Ok(self
            .run(
                input,
                LeafLayer::Level2,
                CoordinatePolicy::new(resolution),
                move |keys: Vec<LeafId>| async move { service.bulk_coordinate_fetch(&keys).await },
            )
            .await)
    }

    /// Stops the lookup workers. The pipeline cannot be used afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.pool.shutdown().await
    }

    async fn run<P, F, Fut>(
        &self,
        input: ParseReport,
        layer: LeafLayer,
        policy: P,
        bulk_call: F,
    ) -> Run<P::Value>
    where
        P: ClassificationPolicy,
        F: FnMut(Vec<LeafId>) -> Fut,
        Fut: Future<Output = core::result::Result<HashMap<LeafId, P::Raw>, ServiceError>>,
    {
        let start = Instant::now();
        let ParseReport { records, warnings } = input;

        // Stage 1: fan out, then fully drain.
        let outcomes: Vec<LookupOutcome> = self.pool.lookup_all(records, layer).await;
        let lookup = start.elapsed();

        // Stage 2: one bulk call per group, sequentially.
        let batch_start = Instant::now();
        let resolutions: Resolutions<P::Raw> = self.resolver.resolve(&outcomes, bulk_call).await;
        let batch = batch_start.elapsed();

        let (results, counts) = ResultAssembler::new(policy).assemble(outcomes, &resolutions);

        Run {
            results,
            counts,
            warnings,
            groups: resolutions.groups().to_vec(),
            timings: StageTimings {
                lookup,
                batch,
                total: start.elapsed(),
            },
        }
    }
}
