//! Stage 2: sequential bulk resolution.
//!
//! [`BatchResolver`] takes the keys found in Stage 1, splits them into groups
//! of at most `max_batch_size` distinct keys and issues one bulk call per
//! group, one after another. Groups are never sent concurrently: the bulk
//! endpoints are heavy and the backend enforces a response-time ceiling.
//!
//! A bulk call is all-or-nothing. If it fails, or leaves any requested key
//! unanswered, every key of that group is marked with a [`BatchFailure`] and
//! the resolver moves on to the next group.

use crate::{
    Error, Result,
    error::{BatchFailure, ServiceError},
    pool::LookupOutcome,
    types::LeafId,
};
use std::{
    collections::{HashMap, hash_map::Entry},
    time::{Duration, Instant},
};

/// Group size for supervoxel → root resolution.
pub const IDENTITY_BATCH_SIZE: usize = 5000;

/// Group size for level-2 coordinate fetches. Each item is heavier, and larger
/// groups run into gateway timeouts.
pub const COORDINATE_BATCH_SIZE: usize = 100;

/// One bulk call's worth of keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchGroup {
    /// 0-based group number, in issue order.
    pub index: usize,
    /// Distinct keys, in first-seen order.
    pub keys: Vec<LeafId>,
    /// Positions of every record whose key is in this group.
    pub positions: Vec<usize>,
}

/// What happened to one group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupReport {
    pub index: usize,
    pub keys: usize,
    pub records: usize,
    pub elapsed: Duration,
    pub failure: Option<BatchFailure>,
}

/// Per-key results of a resolution pass.
#[derive(Clone, Debug)]
pub struct Resolutions<V> {
    values: HashMap<LeafId, core::result::Result<V, BatchFailure>>,
    groups: Vec<GroupReport>,
}

impl<V> Resolutions<V> {
    /// The resolved value or group failure for `key`. `None` if the key was
    /// never part of any group.
    pub fn get(&self, key: &LeafId) -> Option<&core::result::Result<V, BatchFailure>> {
        self.values.get(key)
    }

    pub fn groups(&self) -> &[GroupReport] {
        &self.groups
    }

    pub fn failed_groups(&self) -> usize {
        self.groups.iter().filter(|g| g.failure.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Partitions keys into groups and resolves them one group at a time.
#[derive(Clone, Copy, Debug)]
pub struct BatchResolver {
    max_batch_size: usize,
}

impl BatchResolver {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `max_batch_size` is zero.
    pub fn new(max_batch_size: usize) -> Result<Self> {
        if max_batch_size == 0 {
            return Err(Error::Configuration {
                reason: "batch size must be greater than 0".to_string(),
            });
        }
        Ok(Self { max_batch_size })
    }

    pub const fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Splits the distinct keys of `outcomes` into consecutive groups.
    ///
    /// Every key found in Stage 1 lands in exactly one group; records sharing
    /// a key share its group. Outcomes without a key are skipped.
    pub fn partition(&self, outcomes: &[LookupOutcome]) -> Vec<BatchGroup> {
        let mut order: Vec<LeafId> = Vec::new();
        let mut members: HashMap<LeafId, Vec<usize>> = HashMap::new();

        for outcome in outcomes {
            let Some(key) = outcome.key else { continue };
            match members.entry(key) {
                Entry::Occupied(mut e) => e.get_mut().push(outcome.record.position),
                Entry::Vacant(e) => {
                    order.push(key);
                    e.insert(vec![outcome.record.position]);
                }
            }
        }

        order
            .chunks(self.max_batch_size)
            .enumerate()
            .map(|(index, keys)| BatchGroup {
                index,
                keys: keys.to_vec(),
                positions: keys
                    .iter()
                    .flat_map(|k| members.get(k).into_iter().flatten().copied())
                    .collect(),
            })
            .collect()
    }

    /// Resolves every key of `outcomes` with one `call` per group, in order.
    ///
    /// `call` receives a group's keys and must return a value for each of
    /// them. Failures are recorded per group and never abort the pass.
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "batch", skip_all, fields(max_batch_size = self.max_batch_size)))]
    pub async fn resolve<V, F, Fut>(&self, outcomes: &[LookupOutcome], mut call: F) -> Resolutions<V>
    where
        F: FnMut(Vec<LeafId>) -> Fut,
        Fut: Future<Output = core::result::Result<HashMap<LeafId, V>, ServiceError>>,
    {
        let groups = self.partition(outcomes);
        let total_keys: usize = groups.iter().map(|g| g.keys.len()).sum();
        let mut values = HashMap::with_capacity(total_keys);
        let mut reports = Vec::with_capacity(groups.len());
        let mut _done = 0;
        let _pass_start = Instant::now();

        for group in groups {
            let start = Instant::now();
            let requested = group.keys.len();
            let result = call(group.keys.clone()).await;

            let failure = match result {
                Ok(mut resolved) => {
                    let missing = group
                        .keys
                        .iter()
                        .filter(|k| !resolved.contains_key(k))
                        .count();
                    if missing == 0 {
                        for key in &group.keys {
                            if let Some(value) = resolved.remove(key) {
                                values.insert(*key, Ok(value));
                            }
                        }
                        None
                    } else {
                        Some(BatchFailure::Incomplete { missing, requested })
                    }
                }
                Err(e) => Some(BatchFailure::Service(e)),
            };

            if let Some(failure) = &failure {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Batch {} ({} keys, {} records) failed: {}",
                    group.index + 1,
                    requested,
                    group.positions.len(),
                    failure
                );
                for key in &group.keys {
                    values.insert(*key, Err(failure.clone()));
                }
            }

            _done += requested;
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Batch {}: {}/{} keys resolved ({:.1}s)",
                group.index + 1,
                _done,
                total_keys,
                _pass_start.elapsed().as_secs_f64()
            );

            reports.push(GroupReport {
                index: group.index,
                keys: requested,
                records: group.positions.len(),
                elapsed: start.elapsed(),
                failure,
            });
        }

        Resolutions {
            values,
            groups: reports,
        }
    }
}
