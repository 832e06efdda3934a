//! Progress events making up a run's timeline.
//!
//! Every event carries the common envelope (`correlation_id`, `timestamp`,
//! `elapsed_time`, `metadata`) plus one variant of [`EventKind`]. On the wire
//! the variant is selected by the `event_type` field and its fields sit next
//! to the envelope fields in a single flat JSON object.

use crate::error::CoreError;
use crate::ids::CorrelationId;
use crate::status::ProgressStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A single immutable, timestamped entry of a run's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Run this event belongs to.
    pub correlation_id: CorrelationId,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the run started.
    #[serde(default)]
    pub elapsed_time: f64,
    /// Open metadata for forward compatibility. Business logic never reads it.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Variant-specific payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Closed set of event variants. The serde tag is the wire-level `event_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    /// A run was opened.
    RunStart {
        name: String,
        declared_steps: Vec<String>,
        estimated_duration: Option<f64>,
    },
    /// A run reached (or re-confirmed) its terminal status.
    RunCompletion {
        name: String,
        status: ProgressStatus,
        final_progress: f64,
        total_duration: f64,
        error_count: u32,
        summary: Option<String>,
    },
    /// A step began executing.
    StepStart {
        step_name: String,
        operation: String,
        estimated_duration: Option<f64>,
    },
    /// A step reported intermediate progress.
    StepUpdate {
        step_name: String,
        operation: String,
        progress: f64,
        status: ProgressStatus,
    },
    /// A step finished.
    StepCompletion {
        step_name: String,
        status: ProgressStatus,
        final_progress: f64,
        duration: f64,
        result_summary: Option<String>,
    },
    /// A sub-step of a step began.
    SubStepStart {
        step_name: String,
        sub_step_name: String,
        operation: String,
        estimated_duration: Option<f64>,
    },
    /// A sub-step reported progress.
    SubStepUpdate {
        step_name: String,
        sub_step_name: String,
        operation: String,
        progress: f64,
        status: ProgressStatus,
    },
    /// A sub-step finished.
    SubStepCompletion {
        step_name: String,
        sub_step_name: String,
        status: ProgressStatus,
        final_progress: f64,
        duration: f64,
        result_summary: Option<String>,
    },
    /// An error was observed inside a step. Informational only.
    Error {
        step_name: String,
        error_type: String,
        message: String,
        retry_count: u32,
        recovery_action: Option<String>,
        stack_trace: Option<String>,
    },
    /// A step is about to be retried.
    Retry {
        step_name: String,
        retry_count: u32,
        max_retries: u32,
        reason: String,
        delay: Option<f64>,
    },
    /// A remote contributor reported progress for a step.
    RemoteUpdate {
        service_name: String,
        step_name: String,
        progress: f64,
        operation: String,
        status: ProgressStatus,
        sub_steps: BTreeMap<String, f64>,
    },
}

impl EventKind {
    /// Wire discriminator of the variant.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run_start",
            Self::RunCompletion { .. } => "run_completion",
            Self::StepStart { .. } => "step_start",
            Self::StepUpdate { .. } => "step_update",
            Self::StepCompletion { .. } => "step_completion",
            Self::SubStepStart { .. } => "sub_step_start",
            Self::SubStepUpdate { .. } => "sub_step_update",
            Self::SubStepCompletion { .. } => "sub_step_completion",
            Self::Error { .. } => "error",
            Self::Retry { .. } => "retry",
            Self::RemoteUpdate { .. } => "remote_update",
        }
    }

    /// Step the event refers to, if it is a step-level event.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::RunStart { .. } | Self::RunCompletion { .. } => None,
            Self::StepStart { step_name, .. }
            | Self::StepUpdate { step_name, .. }
            | Self::StepCompletion { step_name, .. }
            | Self::SubStepStart { step_name, .. }
            | Self::SubStepUpdate { step_name, .. }
            | Self::SubStepCompletion { step_name, .. }
            | Self::Error { step_name, .. }
            | Self::Retry { step_name, .. }
            | Self::RemoteUpdate { step_name, .. } => Some(step_name),
        }
    }
}

impl ProgressEvent {
    /// Create a new event with empty metadata.
    pub fn new(
        correlation_id: CorrelationId,
        timestamp: DateTime<Utc>,
        elapsed_time: f64,
        kind: EventKind,
    ) -> Self {
        Self {
            correlation_id,
            timestamp,
            elapsed_time,
            metadata: HashMap::new(),
            kind,
        }
    }

    /// Builder method to attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Wire discriminator of this event.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Step this event refers to, if any.
    pub fn step_name(&self) -> Option<&str> {
        self.kind.step_name()
    }

    /// Returns true for the event that closes a run.
    pub fn is_run_completion(&self) -> bool {
        matches!(self.kind, EventKind::RunCompletion { .. })
    }

    /// Encode into a flat JSON record.
    pub fn encode(&self) -> Result<Value, CoreError> {
        serde_json::to_value(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Decode a JSON record produced by [`ProgressEvent::encode`].
    ///
    /// Fails with [`CoreError::MalformedEvent`] on an unknown `event_type` or a
    /// missing/mistyped required field.
    pub fn decode(record: Value) -> Result<Self, CoreError> {
        serde_json::from_value(record).map_err(|e| CoreError::MalformedEvent(e.to_string()))
    }

    /// Decode from JSON text.
    pub fn decode_str(text: &str) -> Result<Self, CoreError> {
        serde_json::from_str(text).map_err(|e| CoreError::MalformedEvent(e.to_string()))
    }
}

/// Events of one `event_type` within a timeline.
pub fn events_of_type<'a>(
    events: &'a [ProgressEvent],
    event_type: &'a str,
) -> impl Iterator<Item = &'a ProgressEvent> + 'a {
    events.iter().filter(move |e| e.event_type() == event_type)
}

/// Step-level events for one step within a timeline.
pub fn events_for_step<'a>(
    events: &'a [ProgressEvent],
    step_name: &'a str,
) -> impl Iterator<Item = &'a ProgressEvent> + 'a {
    events.iter().filter(move |e| e.step_name() == Some(step_name))
}
