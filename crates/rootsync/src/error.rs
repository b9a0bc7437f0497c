//! Error types for the resolution pipeline.
//!
//! Only [`Error`] ever reaches the caller as a `Result::Err`. The other types
//! describe failures that are *recorded* against individual records or batch
//! groups and surface as part of the classified output instead:
//!
//! - [`LookupErrorKind`]: a single-record lookup failed (Stage 1).
//! - [`ServiceError`]: a bulk remote call failed.
//! - [`BatchFailure`]: a whole batch group could not be resolved (Stage 2).

pub type Result<T> = core::result::Result<T, Error>;

/// Fatal errors. Anything here aborts the run before or instead of producing
/// output.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// Credentials are missing or were rejected by the service.
    #[error("Credential error: {reason}")]
    Credential { reason: String },

    /// The run is misconfigured (bad worker count, unknown datastack, ...).
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Internal channel send/receive failure between the pool and its workers.
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Work was submitted after the lookup pool started shutting down.
    #[error("Lookup pool is shutting down")]
    PoolShutdown,
}

/// Why a single-identifier lookup produced no key.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LookupErrorKind {
    /// The request never got a response (DNS, TLS, timeout, reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The service does not know this identifier.
    #[error("identifier not found")]
    NotFound,

    /// The service answered with a non-success status.
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The service answered but the body could not be decoded.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// The lookup never produced an answer: it panicked, or the pool was
    /// shutting down before a worker could take it.
    #[error("lookup worker failed before answering")]
    WorkerLost,
}

/// Failure of a bulk remote call.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("service error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    /// The response did not line up with the request.
    #[error("expected {expected} values, got {actual}")]
    Incomplete { expected: usize, actual: usize },
}

/// Why every record of a batch group is marked as failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BatchFailure {
    /// The bulk call itself failed.
    #[error("bulk call failed: {0}")]
    Service(#[from] ServiceError),

    /// The bulk call succeeded but left some requested keys unanswered.
    #[error("bulk call omitted {missing} of {requested} keys")]
    Incomplete { missing: usize, requested: usize },
}
