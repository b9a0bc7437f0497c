//! Bounded worker pool for the per-record lookup stage.
//!
//! This module defines [`LookupPool`], which owns a fixed set of asynchronous
//! workers that pull requests off one shared, bounded queue. At most
//! `num_workers` remote lookups are in flight at any time, and a failure on one
//! record, panics included, is recorded on that record's outcome only.
//!
//! Shutdown is cooperative: a shared [`CancellationToken`] refuses new work and
//! each worker acknowledges a shutdown message.

use super::{
    outcome::LookupOutcome,
    request::{LookupTicket, WorkRequest},
    worker::{WorkQueue, worker_loop},
};
use crate::{
    Error, Result,
    record::InputRecord,
    service::AnnotationService,
    types::LeafLayer,
};
use core::time::Duration;
use std::{sync::Arc, time::Instant};
use tokio::{
    sync::{Mutex, mpsc, oneshot},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// Number of completed lookups between progress reports.
pub const PROGRESS_INTERVAL: usize = 500;

/// Default number of concurrent lookups.
pub const DEFAULT_WORKERS: usize = 20;

const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// A pool of lookup workers sharing one service client.
pub struct LookupPool {
    work_tx: mpsc::Sender<WorkRequest>,
    num_workers: usize,
    shutdown_token: CancellationToken,
}

impl LookupPool {
    /// Spawns `num_workers` worker tasks on the current Tokio runtime.
    ///
    /// The work queue holds at most `num_workers` pending requests, so the
    /// feeder never runs far ahead of the workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `num_workers` is zero.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new<S>(service: Arc<S>, num_workers: usize) -> Result<Self>
    where
        S: AnnotationService + ?Sized + 'static,
    {
        if num_workers == 0 {
            return Err(Error::Configuration {
                reason: "worker count must be greater than 0".to_string(),
            });
        }

        let (work_tx, work_rx) = mpsc::channel(num_workers);
        let queue: WorkQueue = Arc::new(Mutex::new(work_rx));

        for worker_id in 0..num_workers {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                Arc::clone(&service),
            ));
        }

        Ok(Self {
            work_tx,
            num_workers,
            shutdown_token: CancellationToken::new(),
        })
    }

    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Looks up every record and returns one outcome per record, ordered by
    /// `position`.
    ///
    /// Records are fed to the workers from a separate task while this task
    /// collects outcomes. Lookups are never retried. A record whose lookup
    /// panicked, or that could not be handed to a worker because the pool is
    /// shutting down, is reported as [`LookupErrorKind::WorkerLost`].
    ///
    /// [`LookupErrorKind::WorkerLost`]: crate::LookupErrorKind::WorkerLost
    #[cfg_attr(feature = "tracing", tracing::instrument(name = "lookup", skip_all, fields(records = records.len(), workers = self.num_workers)))]
    pub async fn lookup_all(&self, records: Vec<InputRecord>, layer: LeafLayer) -> Vec<LookupOutcome> {
        let total = records.len();
        if total == 0 {
            return Vec::new();
        }

        let _start = Instant::now();
        // Every ticket answers on this channel exactly once, so it closes
        // after the last answer. It needs no bound: it never holds more than
        // `total` entries.
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let feeder = {
            let work_tx = self.work_tx.clone();
            let token = self.shutdown_token.clone();
            tokio::spawn(async move {
                let mut refused = false;
                for (slot, record) in records.into_iter().enumerate() {
                    let ticket = LookupTicket::new(slot, record, outcome_tx.clone());
                    if refused {
                        continue;
                    }
                    let request = WorkRequest::Lookup { ticket, layer };
                    // A refused request drops its ticket, which answers for it.
                    if let Err(_e) = send_work(&work_tx, &token, request).await {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Stopped feeding lookups at record {slot}: {_e}");
                        refused = true;
                    }
                }
            })
        };

        let mut slots: Vec<Option<LookupOutcome>> = vec![None; total];
        let mut completed = 0;
        let mut _failed = 0;

        while let Some((slot, outcome)) = outcome_rx.recv().await {
            if outcome.is_failed() {
                _failed += 1;
            }
            slots[slot] = Some(outcome);
            completed += 1;

            if completed % PROGRESS_INTERVAL == 0 || completed == total {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "{}/{} lookups done ({:.1}s, {} errors)",
                    completed,
                    total,
                    _start.elapsed().as_secs_f64(),
                    _failed
                );
            }

            if completed == total {
                break;
            }
        }

        if let Err(_e) = feeder.await {
            #[cfg(feature = "tracing")]
            tracing::error!("Lookup feeder task failed: {_e}");
        }

        let mut outcomes: Vec<LookupOutcome> = slots.into_iter().flatten().collect();
        outcomes.sort_by_key(|o| o.record.position);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Lookups finished: {} keys in {:.1}s ({} errors)",
            outcomes.iter().filter(|o| o.key.is_some()).count(),
            _start.elapsed().as_secs_f64(),
            outcomes.iter().filter(|o| o.is_failed()).count()
        );

        outcomes
    }

    /// Shuts down all workers.
    ///
    /// - Cancels the shared [`CancellationToken`] to refuse new work.
    /// - Sends a shutdown message for each worker.
    /// - Waits (up to 3 seconds per worker) for the acknowledgements.
    ///
    /// Workers that already exited are skipped.
    pub async fn shutdown(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::debug!("Refusing new lookups");
        self.shutdown_token.cancel();

        let mut shutdown_handles = Vec::with_capacity(self.num_workers);
        for _i in 0..self.num_workers {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = self.work_tx.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::debug!("Work queue already closed, {_i} workers notified");
                break;
            }
            shutdown_handles.push((_i, rx));
        }

        let timeout_futures = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(SHUTDOWN_ACK_TIMEOUT, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Shutdown {_i} acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Shutdown {_i} dropped: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Shutdown {_i} timed out");
                }
            }
        });

        futures::future::join_all(timeout_futures).await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Lookup pool shutdown complete");

        Ok(())
    }
}

async fn send_work(
    work_tx: &mpsc::Sender<WorkRequest>,
    token: &CancellationToken,
    request: WorkRequest,
) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::PoolShutdown);
    }

    work_tx.send(request).await.map_err(|_| Error::ChannelError {
        context: "lookup work queue closed".to_string(),
    })
}
