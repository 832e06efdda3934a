//! Process-wide default tracker.

use std::sync::OnceLock;

use crate::error::TrackerError;
use crate::tracker::Tracker;

static GLOBAL: OnceLock<Tracker> = OnceLock::new();

/// Install the process-wide tracker. Can only happen once.
pub fn install_global(tracker: Tracker) -> Result<(), TrackerError> {
    GLOBAL
        .set(tracker)
        .map_err(|_| TrackerError::AlreadyInitialized)
}

/// Handle to the process-wide tracker.
pub fn global() -> Result<Tracker, TrackerError> {
    GLOBAL.get().cloned().ok_or(TrackerError::NotInitialized)
}
