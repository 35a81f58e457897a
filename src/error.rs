//! Error Taxonomy
//!
//! Typed failures for the mutation loop. Locally-recoverable conditions
//! (a single provider failing over, a candidate rejected by the validator)
//! never appear here; only the faults that end a cycle or the process do.

use thiserror::Error;

/// Code Store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The live source image could not be read.
    #[error("source image unreadable at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot, write, or rename failed during commit. The live image is
    /// guaranteed untouched when this is returned.
    #[error("storage failure during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Provider Gateway failures that end a consultation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every provider in the failover list was tried once and failed.
    #[error("all {attempted} provider(s) exhausted")]
    AllProvidersExhausted { attempted: usize },

    /// The gateway was constructed with an empty provider list.
    #[error("no providers configured")]
    NoProviders,
}

/// A fatal fault within one mutation cycle. Validation rejections are not
/// errors; they surface as a clean `CycleOutcome::Rejected`.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("introspection failed: {0}")]
    Introspect(#[source] StoreError),

    #[error("consultation failed: {0}")]
    Consult(#[source] GatewayError),

    /// Commit failures require manual intervention: the loop halts rather
    /// than retrying blindly against a misbehaving disk.
    #[error("commit failed: {0}")]
    Commit(#[source] StoreError),
}

impl CycleError {
    /// True when the supervisor must stop the loop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CycleError::Commit(_))
    }
}
