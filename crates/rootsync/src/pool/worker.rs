use super::request::WorkRequest;
use crate::{
    error::LookupErrorKind,
    service::AnnotationService,
    types::{LeafId, LeafLayer, RootId},
};
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{Mutex, mpsc};

/// The receiving end of the pool's work queue, shared by every worker.
///
/// Whichever idle worker takes the lock next gets the next request, so a
/// worker stuck in a slow remote call never holds up work that another worker
/// could pick up.
pub(crate) type WorkQueue = Arc<Mutex<mpsc::Receiver<WorkRequest>>>;

/// Worker task that performs single-record lookups.
///
/// Runs until it receives [`WorkRequest::Shutdown`] or the queue closes. A
/// lookup that panics is answered with [`LookupErrorKind::WorkerLost`] and the
/// worker moves on to the next request.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker (used for logs/tracing).
/// - `queue`: Shared queue of [`WorkRequest`]s.
/// - `service`: The run's shared service client.
pub(crate) async fn worker_loop<S>(worker_id: usize, queue: WorkQueue, service: Arc<S>)
where
    S: AnnotationService + ?Sized,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        // The guard is dropped at the end of this statement, before the
        // remote call, so other workers can pull while this one waits.
        let work = queue.lock().await.recv().await;

        match work {
            Some(WorkRequest::Lookup { ticket, layer }) => {
                let id = ticket.id();
                let result = AssertUnwindSafe(handle_lookup(worker_id, service.as_ref(), id, layer))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_panic| {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Worker {worker_id} panicked while looking up {id}");
                        Err(LookupErrorKind::WorkerLost)
                    });
                ticket.complete(result);
            }
            Some(WorkRequest::Shutdown { response }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
            None => break,
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

/// Runs one lookup. Errors are returned for the record's outcome and never
/// stop the worker.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(level = "trace", skip(_worker_id, service), fields(worker = _worker_id))
)]
async fn handle_lookup<S>(
    _worker_id: usize,
    service: &S,
    id: RootId,
    layer: LeafLayer,
) -> Result<Option<LeafId>, LookupErrorKind>
where
    S: AnnotationService + ?Sized,
{
    let result = service.lookup_one(id, layer).await;

    #[cfg(feature = "tracing")]
    match &result {
        Ok(None) => tracing::debug!("No {:?} leaves for {}", layer, id),
        Err(e) => tracing::debug!("Lookup failed for {}: {}", id, e),
        Ok(Some(_)) => {}
    }

    result
}
