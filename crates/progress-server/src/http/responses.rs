//! HTTP request and response types.

use serde::{Deserialize, Serialize};

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn run_not_found(correlation_id: &str) -> Self {
        Self {
            error: format!("No progress found for correlation_id {correlation_id}"),
        }
    }
}

/// Query string of the timeline endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Only return events with this `event_type`.
    pub event_type: Option<String>,
}

/// Response body of a manual eviction.
#[derive(Debug, Serialize)]
pub struct EvictResponse {
    pub correlation_id: String,
    pub evicted: bool,
}
