//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::tracker::Tracker;

/// Shared application state.
pub struct AppState {
    /// The run tracker.
    pub tracker: Tracker,

    /// Milestone `event_type` -> synthetic step name.
    pub milestones: HashMap<String, String>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(tracker: Tracker, config: &Config) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            milestones: config.milestones.clone(),
        })
    }

    /// Step name for a milestone event type, if it is one.
    pub fn milestone_step(&self, event_type: &str) -> Option<&str> {
        self.milestones.get(event_type).map(String::as_str)
    }
}

impl Default for AppState {
    fn default() -> Self {
        let config = Config::default();
        Self {
            tracker: Tracker::new(config.tracker_config()),
            milestones: config.milestones,
        }
    }
}
