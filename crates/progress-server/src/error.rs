//! Tracker errors.

use thiserror::Error;

/// Errors surfaced by the tracker subsystem.
///
/// Normal operational conditions (unknown correlation id, duplicate
/// completion, out-of-range progress) are never errors; only misuse of the
/// process-wide default instance is.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The process-wide tracker was requested before it was installed.
    #[error("Progress tracker not initialized")]
    NotInitialized,

    /// A process-wide tracker is already installed.
    #[error("Progress tracker already initialized")]
    AlreadyInitialized,
}
