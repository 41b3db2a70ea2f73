//! Check scheduling errors.

use ratchet_core::{CheckId, CheckableRef};
use ratchet_storage::StorageError;

/// Result type for check operations.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Errors returned by the check scheduler and reporter.
///
/// A skipped check is not an error; see [`crate::CheckOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// The store failed; the caller retries on its next tick
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// `check_every` could not be parsed
    #[error("invalid check_every '{value}' on {checkable}: {reason}")]
    InvalidCheckEvery {
        /// Checkable carrying the value
        checkable: CheckableRef,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },

    /// Resource types refer to each other in a loop
    #[error("resource type dependency cycle at {0}")]
    DependencyCycle(CheckableRef),

    /// The checkable a check belongs to no longer exists
    #[error("unknown checkable: {0}")]
    UnknownCheckable(CheckableRef),

    /// No such check
    #[error("unknown check: {0}")]
    UnknownCheck(CheckId),

    /// The check already terminated
    #[error("check {0} is not running")]
    NotRunning(CheckId),
}
