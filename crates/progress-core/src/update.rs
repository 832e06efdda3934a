//! Wire types for progress reported by remote contributors.

use serde::{Deserialize, Serialize};

/// `event_type` of a step progress report.
pub const STEP_PROGRESS: &str = "step_progress";

/// `event_type` of an error report.
pub const ERROR: &str = "error";

/// `event_type` of the keyword-processing milestone.
pub const KEYWORDS_PROCESSED: &str = "keywords_processed";

/// Body of `POST /progress/update`.
///
/// Every field except `correlation_id` is optional so best-effort reporters
/// can send partial payloads; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub event_type: String,
    pub service_name: Option<String>,
    pub step_name: Option<String>,
    pub progress_percentage: Option<f64>,
    pub current_operation: Option<String>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub retry_attempt: Option<u32>,
}

impl ProgressUpdate {
    /// Create an update of the given type for a correlation id.
    pub fn new(correlation_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the reporting service.
    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Builder method to set the step.
    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    /// Builder method to set progress and the operation label.
    pub fn with_progress(mut self, progress: f64, operation: impl Into<String>) -> Self {
        self.progress_percentage = Some(progress);
        self.current_operation = Some(operation.into());
        self
    }

    /// Builder method to set error details.
    pub fn with_error(
        mut self,
        message: impl Into<String>,
        error_type: impl Into<String>,
        retry_attempt: u32,
    ) -> Self {
        self.error_message = Some(message.into());
        self.error_type = Some(error_type.into());
        self.retry_attempt = Some(retry_attempt);
        self
    }

    /// The correlation id, if present and non-empty.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Response body of `POST /progress/update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAck {
    pub status: String,
    pub message: String,
}

impl UpdateAck {
    /// Acknowledge a received update.
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: "Progress update received".to_string(),
        }
    }

    /// Reject an update.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }

    /// Returns true if the update was accepted.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}
