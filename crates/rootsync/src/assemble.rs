//! Final classification.
//!
//! [`ResultAssembler`] walks the Stage 1 outcomes in input order, looks up
//! each record's key in the Stage 2 [`Resolutions`], and asks a
//! [`ClassificationPolicy`] what the resolved value means for that record.
//! Records that fell out earlier are classified by the stage that dropped them.

use crate::{
    batch::Resolutions,
    pool::LookupOutcome,
    record::InputRecord,
    types::{NmCoord, Resolution, RootId, VoxelCoord},
};
use core::fmt;

/// Per-record classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Resolved; the identifier is still current.
    Current,
    /// Resolved to a different identifier.
    Updated,
    /// The lookup succeeded but found no leaf to resolve through.
    Unresolved,
    /// The per-record lookup failed.
    LookupFailed,
    /// The record's batch group failed.
    BatchFailed,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::Current,
        Self::Updated,
        Self::Unresolved,
        Self::LookupFailed,
        Self::BatchFailed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Updated => "UPDATED",
            Self::Unresolved => "UNRESOLVED",
            Self::LookupFailed => "LOOKUP_FAILED",
            Self::BatchFailed => "BATCH_FAILED",
        }
    }

    /// Whether the record made it through both stages.
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Current | Self::Updated)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final result for one input record.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedResult<V> {
    pub record: InputRecord,
    /// Present exactly when `status.is_resolved()`.
    pub resolved: Option<V>,
    pub status: Status,
    /// Why the record failed, for failed statuses.
    pub reason: Option<String>,
}

/// Turns a raw bulk-call value into a final value and status.
pub trait ClassificationPolicy {
    /// What the bulk call returns per key.
    type Raw;
    /// What ends up in [`ResolvedResult::resolved`].
    type Value;

    fn classify(&self, record: &InputRecord, raw: &Self::Raw) -> (Status, Self::Value);
}

/// Compares each record's identifier with the current root of its supervoxel.
///
/// Resolving through a supervoxel follows the segment's actual split/merge
/// history. A "latest root" shortcut can land on an unrelated successor after
/// a split, so it is not used.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPolicy;

impl ClassificationPolicy for IdentityPolicy {
    type Raw = RootId;
    type Value = RootId;

    fn classify(&self, record: &InputRecord, raw: &RootId) -> (Status, RootId) {
        if *raw == record.id {
            (Status::Current, *raw)
        } else {
            (Status::Updated, *raw)
        }
    }
}

/// Converts a level-2 chunk's nanometer position to voxels.
///
/// The coordinate is the centroid of *one* chunk of the segment. It is a
/// convenient place to jump to, not a representative anatomical location.
#[derive(Clone, Copy, Debug)]
pub struct CoordinatePolicy {
    resolution: Resolution,
}

impl CoordinatePolicy {
    pub const fn new(resolution: Resolution) -> Self {
        Self { resolution }
    }
}

impl ClassificationPolicy for CoordinatePolicy {
    type Raw = NmCoord;
    type Value = VoxelCoord;

    fn classify(&self, _record: &InputRecord, raw: &NmCoord) -> (Status, VoxelCoord) {
        (Status::Current, self.resolution.to_voxel(*raw))
    }
}

/// Number of records per status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub current: usize,
    pub updated: usize,
    pub unresolved: usize,
    pub lookup_failed: usize,
    pub batch_failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: Status) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: Status) -> usize {
        match status {
            Status::Current => self.current,
            Status::Updated => self.updated,
            Status::Unresolved => self.unresolved,
            Status::LookupFailed => self.lookup_failed,
            Status::BatchFailed => self.batch_failed,
        }
    }

    pub const fn total(&self) -> usize {
        self.current + self.updated + self.unresolved + self.lookup_failed + self.batch_failed
    }

    pub const fn resolved(&self) -> usize {
        self.current + self.updated
    }

    pub const fn errors(&self) -> usize {
        self.unresolved + self.lookup_failed + self.batch_failed
    }

    fn slot(&mut self, status: Status) -> &mut usize {
        match status {
            Status::Current => &mut self.current,
            Status::Updated => &mut self.updated,
            Status::Unresolved => &mut self.unresolved,
            Status::LookupFailed => &mut self.lookup_failed,
            Status::BatchFailed => &mut self.batch_failed,
        }
    }
}

/// Merges both stages back into one ordered result list.
#[derive(Clone, Copy, Debug)]
pub struct ResultAssembler<P> {
    policy: P,
}

impl<P: ClassificationPolicy> ResultAssembler<P> {
    pub const fn new(policy: P) -> Self {
        Self { policy }
    }

    /// Produces one [`ResolvedResult`] per outcome, sorted by `position`.
    pub fn assemble(
        &self,
        mut outcomes: Vec<LookupOutcome>,
        resolutions: &Resolutions<P::Raw>,
    ) -> (Vec<ResolvedResult<P::Value>>, StatusCounts) {
        outcomes.sort_by_key(|o| o.record.position);

        let mut counts = StatusCounts::default();
        let results: Vec<_> = outcomes
            .into_iter()
            .map(|outcome| {
                let result = self.classify(outcome, resolutions);
                counts.record(result.status);
                result
            })
            .collect();

        (results, counts)
    }

    fn classify(
        &self,
        outcome: LookupOutcome,
        resolutions: &Resolutions<P::Raw>,
    ) -> ResolvedResult<P::Value> {
        let LookupOutcome { record, key, error } = outcome;

        if let Some(e) = error {
            return failed(record, Status::LookupFailed, e.to_string());
        }

        let Some(key) = key else {
            return ResolvedResult {
                record,
                resolved: None,
                status: Status::Unresolved,
                reason: Some("no leaves found".to_string()),
            };
        };

        match resolutions.get(&key) {
            Some(Ok(raw)) => {
                let (status, value) = self.policy.classify(&record, raw);
                ResolvedResult {
                    record,
                    resolved: Some(value),
                    status,
                    reason: None,
                }
            }
            Some(Err(failure)) => failed(record, Status::BatchFailed, failure.to_string()),
            // Every key from Stage 1 is partitioned, so this only happens when
            // the resolutions came from a different set of outcomes.
            None => failed(
                record,
                Status::BatchFailed,
                format!("leaf {key} was not part of any batch"),
            ),
        }
    }
}

fn failed<V>(record: InputRecord, status: Status, reason: String) -> ResolvedResult<V> {
    ResolvedResult {
        record,
        resolved: None,
        status,
        reason: Some(reason),
    }
}
