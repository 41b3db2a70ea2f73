//! Resolution errors.
//!
//! An input that cannot be resolved is not an error; it is reported in the
//! [`ratchet_core::ResolvedInputSet`]. These are failures of the call itself.

use ratchet_storage::StorageError;

/// Result type for resolution.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Errors returned by the resolver and the input mapper.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The snapshot does not describe the job being resolved
    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    /// Reading the snapshot or saving results failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
