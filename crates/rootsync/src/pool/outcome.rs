use crate::{
    error::LookupErrorKind,
    record::InputRecord,
    types::LeafId,
};

/// The Stage 1 result for one record. Exactly one exists per record.
///
/// | `key`    | `error`  | meaning                                 |
/// |----------|----------|-----------------------------------------|
/// | `Some`   | `None`   | found a leaf, goes on to batching       |
/// | `None`   | `None`   | lookup succeeded, segment has no leaves |
/// | `None`   | `Some`   | lookup failed                           |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupOutcome {
    pub record: InputRecord,
    pub key: Option<LeafId>,
    pub error: Option<LookupErrorKind>,
}

impl LookupOutcome {
    pub const fn found(record: InputRecord, key: Option<LeafId>) -> Self {
        Self {
            record,
            key,
            error: None,
        }
    }

    pub const fn failed(record: InputRecord, error: LookupErrorKind) -> Self {
        Self {
            record,
            key: None,
            error: Some(error),
        }
    }

    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}
