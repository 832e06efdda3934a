//! Progress server configuration.

use std::collections::HashMap;
use std::time::Duration;

use progress_core::update::KEYWORDS_PROCESSED;

use crate::tracker::TrackerConfig;

/// Step name that keyword-processing milestones are relayed into.
pub const KEYWORD_PROCESSING_STEP: &str = "keyword_processing";

/// Progress server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    /// How long finished runs are kept after their last update (seconds).
    pub retention_ttl_secs: u64,

    /// Interval between retention sweeps (seconds).
    pub sweep_interval_secs: u64,

    /// Capacity of the live event channel feeding SSE consumers.
    pub event_buffer: usize,

    /// Milestone `event_type` -> synthetic step name it is relayed into.
    pub milestones: HashMap<String, String>,
}

impl Config {
    /// The subset of settings owned by the tracker.
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            retention_ttl: Duration::from_secs(self.retention_ttl_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            event_buffer: self.event_buffer,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut milestones = HashMap::new();
        milestones.insert(
            KEYWORDS_PROCESSED.to_string(),
            KEYWORD_PROCESSING_STEP.to_string(),
        );

        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            retention_ttl_secs: 3600,
            sweep_interval_secs: 300,
            event_buffer: 1024,
            milestones,
        }
    }
}
