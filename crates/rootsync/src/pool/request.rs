use super::outcome::LookupOutcome;
use crate::{
    error::LookupErrorKind,
    record::InputRecord,
    types::{LeafId, LeafLayer, RootId},
};
use tokio::sync::{mpsc, oneshot};

pub(crate) type OutcomeSender = mpsc::UnboundedSender<(usize, LookupOutcome)>;

/// A message on the shared work queue.
pub(crate) enum WorkRequest {
    /// Look up one record.
    Lookup {
        ticket: LookupTicket,
        layer: LeafLayer,
    },
    /// Stop the receiving worker and acknowledge.
    Shutdown { response: oneshot::Sender<()> },
}

/// One record's claim on an outcome.
///
/// A ticket answers exactly once: through [`LookupTicket::complete`], or with
/// [`LookupErrorKind::WorkerLost`] when it is dropped unanswered (refused by a
/// closed queue, left behind in the queue, or unwound through by a panic).
pub(crate) struct LookupTicket {
    slot: usize,
    id: RootId,
    record: Option<InputRecord>,
    outcome_tx: OutcomeSender,
}

impl LookupTicket {
    pub(crate) fn new(slot: usize, record: InputRecord, outcome_tx: OutcomeSender) -> Self {
        Self {
            slot,
            id: record.id,
            record: Some(record),
            outcome_tx,
        }
    }

    pub(crate) const fn id(&self) -> RootId {
        self.id
    }

    pub(crate) fn complete(mut self, result: Result<Option<LeafId>, LookupErrorKind>) {
        let Some(record) = self.record.take() else {
            return;
        };
        let outcome = match result {
            Ok(key) => LookupOutcome::found(record, key),
            Err(e) => LookupOutcome::failed(record, e),
        };
        self.send(outcome);
    }

    fn send(&self, outcome: LookupOutcome) {
        // The collector only stops listening once every slot is filled.
        let _ = self.outcome_tx.send((self.slot, outcome));
    }
}

impl Drop for LookupTicket {
    fn drop(&mut self) {
        if let Some(record) = self.record.take() {
            self.send(LookupOutcome::failed(record, LookupErrorKind::WorkerLost));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(position: usize, id: u64) -> InputRecord {
        InputRecord {
            position,
            raw_label: id.to_string(),
            id: RootId::new(id),
        }
    }

    #[test]
    fn completed_ticket_answers_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticket = LookupTicket::new(3, record(3, 30), tx);
        assert_eq!(ticket.id(), RootId::new(30));

        ticket.complete(Ok(Some(LeafId::new(300))));

        let (slot, outcome) = rx.try_recv().unwrap();
        assert_eq!(slot, 3);
        assert_eq!(outcome.key, Some(LeafId::new(300)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_ticket_reports_worker_lost() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        drop(LookupTicket::new(0, record(0, 7), tx));

        let (slot, outcome) = rx.try_recv().unwrap();
        assert_eq!(slot, 0);
        assert_eq!(outcome.record.id, RootId::new(7));
        assert_eq!(outcome.error, Some(LookupErrorKind::WorkerLost));
    }
}
