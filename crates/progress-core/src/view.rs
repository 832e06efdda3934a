//! Aggregated read model of a run for dashboards and one-shot API responses.

use crate::ids::CorrelationId;
use crate::run::{Run, StepState};
use crate::status::ProgressStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Consolidated projection of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedView {
    pub correlation_id: CorrelationId,
    pub name: String,
    pub overall_progress: f64,
    pub status: ProgressStatus,
    pub current_step: String,
    pub current_operation: String,
    /// Seconds since the run started.
    pub elapsed_time: f64,
    pub start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub error_count: u32,
    pub event_count: usize,
    pub summary: Option<String>,
    /// Declared steps in declaration order, then discovered steps by name.
    pub steps: Vec<StepView>,
}

/// Projection of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub name: String,
    pub status: ProgressStatus,
    pub progress: f64,
    pub operation: String,
    pub sub_steps: BTreeMap<String, f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_count: u32,
}

impl From<&StepState> for StepView {
    fn from(step: &StepState) -> Self {
        Self {
            name: step.name.clone(),
            status: step.status,
            progress: step.progress_percentage,
            operation: step.current_operation.clone(),
            sub_steps: step.sub_steps.clone(),
            start_time: step.start_time,
            end_time: step.end_time,
            error_count: step.error_count,
        }
    }
}

impl AggregatedView {
    /// Build the view from a borrowed run, as observed at `now`.
    pub fn from_run(run: &Run, now: DateTime<Utc>) -> Self {
        Self {
            correlation_id: run.correlation_id.clone(),
            name: run.name.clone(),
            overall_progress: run.overall_progress,
            status: run.status,
            current_step: run.current_step.clone(),
            current_operation: run.current_operation.clone(),
            elapsed_time: run.elapsed_secs(now),
            start_time: run.start_time,
            last_update: run.last_update,
            error_count: run.error_count,
            event_count: run.events.len(),
            summary: run.summary.clone(),
            steps: run.ordered_steps().into_iter().map(StepView::from).collect(),
        }
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&StepView> {
        self.steps.iter().find(|s| s.name == name)
    }
}
