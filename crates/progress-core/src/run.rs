//! Run and StepState types.
//!
//! A [`Run`] owns its steps and its append-only timeline. Every mutating
//! method appends exactly the events it produces and then re-derives the
//! aggregate fields, so callers that hold a run under a lock get
//! event-append, state mutation and recompute as one step.

use crate::event::{EventKind, ProgressEvent};
use crate::ids::CorrelationId;
use crate::status::ProgressStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One declared or dynamically discovered unit of work inside a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// Step name.
    pub name: String,

    /// Current step status.
    pub status: ProgressStatus,

    /// Progress in [0, 100].
    pub progress_percentage: f64,

    /// When the step started.
    pub start_time: Option<DateTime<Utc>>,

    /// When the step finished (if terminal).
    pub end_time: Option<DateTime<Utc>>,

    /// Label of the most recent action.
    pub current_operation: String,

    /// Informational sub-step progress, by sub-step name.
    pub sub_steps: BTreeMap<String, f64>,

    /// Failures recorded against this step.
    pub error_count: u32,
}

impl StepState {
    /// Create a pending step at 0%.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ProgressStatus::Pending,
            progress_percentage: 0.0,
            start_time: None,
            end_time: None,
            current_operation: String::new(),
            sub_steps: BTreeMap::new(),
            error_count: 0,
        }
    }

    /// Mark the step as running, recording the start time once.
    fn begin(&mut self, now: DateTime<Utc>) {
        self.status = ProgressStatus::Running;
        if self.start_time.is_none() {
            self.start_time = Some(now);
        }
    }

    /// Seconds since the step started, 0 if it never started.
    fn duration(&self, now: DateTime<Utc>) -> f64 {
        self.start_time
            .map(|start| seconds_between(start, now))
            .unwrap_or(0.0)
    }
}

/// One tracked execution of a workflow, keyed by correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Primary key, immutable once assigned.
    pub correlation_id: CorrelationId,

    /// Human readable run name.
    pub name: String,

    /// When the run was opened.
    pub start_time: DateTime<Utc>,

    /// Last time any operation touched the run.
    pub last_update: DateTime<Utc>,

    /// Current run status.
    pub status: ProgressStatus,

    /// Step names known at creation. Denominator of `overall_progress`.
    pub declared_steps: Vec<String>,

    /// Step state by step name (declared and discovered).
    pub steps: HashMap<String, StepState>,

    /// Mean progress over declared steps, in [0, 100].
    pub overall_progress: f64,

    /// Errors reported against the run. Never decreases.
    pub error_count: u32,

    /// Step touched most recently.
    pub current_step: String,

    /// Operation label reported most recently.
    pub current_operation: String,

    /// Summary given at completion.
    pub summary: Option<String>,

    /// Set once the run is explicitly completed. Progress is frozen from then
    /// on; a status derived from the steps is not.
    #[serde(default)]
    pub closed: bool,

    /// Append-only timeline.
    pub events: Vec<ProgressEvent>,
}

impl Run {
    /// Open a run: every declared step starts PENDING at 0% and the timeline
    /// starts with a `run_start` event.
    pub fn new(
        correlation_id: CorrelationId,
        name: impl Into<String>,
        declared_steps: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let steps = declared_steps
            .iter()
            .map(|step| (step.clone(), StepState::new(step.clone())))
            .collect();

        let mut run = Self {
            correlation_id,
            name: name.clone(),
            start_time: now,
            last_update: now,
            status: ProgressStatus::Pending,
            declared_steps: declared_steps.clone(),
            steps,
            overall_progress: 0.0,
            error_count: 0,
            current_step: String::new(),
            current_operation: String::new(),
            summary: None,
            closed: false,
            events: Vec::new(),
        };
        run.push_event(
            now,
            EventKind::RunStart {
                name,
                declared_steps,
                estimated_duration: None,
            },
        );
        run
    }

    /// Check if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds elapsed since the run started. Frozen at `last_update` once
    /// the run is terminal.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        let end = if self.is_terminal() { self.last_update } else { now };
        seconds_between(self.start_time, end)
    }

    /// Steps in display order: declared steps first, then discovered ones by name.
    pub fn ordered_steps(&self) -> Vec<&StepState> {
        let mut ordered: Vec<&StepState> = self
            .declared_steps
            .iter()
            .filter_map(|name| self.steps.get(name))
            .collect();
        let mut discovered: Vec<&StepState> = self
            .steps
            .values()
            .filter(|step| !self.declared_steps.contains(&step.name))
            .collect();
        discovered.sort_by(|a, b| a.name.cmp(&b.name));
        ordered.extend(discovered);
        ordered
    }

    /// Mark a step as running.
    pub fn start_step(&mut self, step_name: &str, operation: &str, now: DateTime<Utc>) {
        let step = self.step_entry(step_name);
        if step.status.is_active() {
            step.status = ProgressStatus::Running;
            step.start_time = Some(now);
            step.current_operation = operation.to_string();
        }
        self.touch(step_name, operation, now);
        self.push_event(
            now,
            EventKind::StepStart {
                step_name: step_name.to_string(),
                operation: operation.to_string(),
                estimated_duration: None,
            },
        );
        self.recompute();
    }

    /// Record step progress, optionally with a sub-step value. Progress
    /// values are clamped to [0, 100].
    pub fn update_step(
        &mut self,
        step_name: &str,
        progress: f64,
        operation: &str,
        sub_step: Option<(&str, f64)>,
        now: DateTime<Utc>,
    ) {
        let progress = clamp_progress(progress);
        let sub_step = sub_step.map(|(name, value)| (name, clamp_progress(value)));

        let step = self.step_entry(step_name);
        if step.status.is_active() {
            step.begin(now);
            step.progress_percentage = progress;
            step.current_operation = operation.to_string();
            if let Some((name, value)) = sub_step {
                step.sub_steps.insert(name.to_string(), value);
            }
        }
        // A finished step ignores the update; the event reports its actual state.
        let status = step.status;
        let step_progress = step.progress_percentage;
        let sub_step = sub_step.map(|(name, value)| {
            let recorded = step.sub_steps.get(name).copied().unwrap_or(value);
            (name, if status.is_active() { value } else { recorded })
        });
        self.touch(step_name, operation, now);

        let kind = match sub_step {
            Some((sub_step_name, value)) => EventKind::SubStepUpdate {
                step_name: step_name.to_string(),
                sub_step_name: sub_step_name.to_string(),
                operation: operation.to_string(),
                progress: value,
                status,
            },
            None => EventKind::StepUpdate {
                step_name: step_name.to_string(),
                operation: operation.to_string(),
                progress: step_progress,
                status,
            },
        };
        self.push_event(now, kind);
        self.recompute();
    }

    /// Finish a step. Success pins progress to 100; failure keeps the last
    /// value and counts one error on the step and on the run.
    pub fn complete_step(&mut self, step_name: &str, success: bool, now: DateTime<Utc>) {
        let step = self.step_entry(step_name);
        let applies = step.status.is_active();
        if applies {
            step.status = ProgressStatus::from_success(success);
            step.end_time = Some(now);
            if success {
                step.progress_percentage = 100.0;
            } else {
                step.error_count += 1;
            }
        }
        let status = step.status;
        let final_progress = step.progress_percentage;
        let duration = step.duration(now);
        if applies && !success {
            self.error_count += 1;
        }
        self.last_update = now;
        self.current_step = step_name.to_string();

        self.push_event(
            now,
            EventKind::StepCompletion {
                step_name: step_name.to_string(),
                status,
                final_progress,
                duration,
                result_summary: None,
            },
        );
        self.recompute();
    }

    /// Register a sub-step at 0%.
    pub fn start_sub_step(
        &mut self,
        step_name: &str,
        sub_step_name: &str,
        operation: &str,
        now: DateTime<Utc>,
    ) {
        let step = self.step_entry(step_name);
        if step.status.is_active() {
            step.sub_steps.entry(sub_step_name.to_string()).or_insert(0.0);
            step.current_operation = operation.to_string();
        }
        self.touch(step_name, operation, now);
        self.push_event(
            now,
            EventKind::SubStepStart {
                step_name: step_name.to_string(),
                sub_step_name: sub_step_name.to_string(),
                operation: operation.to_string(),
                estimated_duration: None,
            },
        );
    }

    /// Finish a sub-step. Sub-steps carry no status of their own, so only
    /// the recorded value changes (100 on success).
    pub fn complete_sub_step(
        &mut self,
        step_name: &str,
        sub_step_name: &str,
        success: bool,
        now: DateTime<Utc>,
    ) {
        let step = self.step_entry(step_name);
        let status = if step.status.is_active() {
            ProgressStatus::from_success(success)
        } else {
            step.status
        };
        if step.status.is_active() && success {
            step.sub_steps.insert(sub_step_name.to_string(), 100.0);
        }
        let final_progress = step.sub_steps.get(sub_step_name).copied().unwrap_or(0.0);
        let duration = self
            .events
            .iter()
            .rev()
            .find_map(|event| match &event.kind {
                EventKind::SubStepStart {
                    step_name: s,
                    sub_step_name: sub,
                    ..
                } if s == step_name && sub == sub_step_name => {
                    Some(seconds_between(event.timestamp, now))
                }
                _ => None,
            })
            .unwrap_or(0.0);
        self.last_update = now;
        self.current_step = step_name.to_string();

        self.push_event(
            now,
            EventKind::SubStepCompletion {
                step_name: step_name.to_string(),
                sub_step_name: sub_step_name.to_string(),
                status,
                final_progress,
                duration,
                result_summary: None,
            },
        );
    }

    /// Returns true once a step has left PENDING.
    pub fn step_started(&self, step_name: &str) -> bool {
        self.steps
            .get(step_name)
            .is_some_and(|step| step.status != ProgressStatus::Pending || step.start_time.is_some())
    }

    /// Merge sub-step values into a step without emitting an event.
    pub fn merge_sub_steps(&mut self, step_name: &str, sub_steps: &BTreeMap<String, f64>) {
        let step = self.step_entry(step_name);
        if step.status.is_active() {
            for (name, value) in sub_steps {
                step.sub_steps.insert(name.clone(), clamp_progress(*value));
            }
        }
    }

    /// Annotate the run with an error. Step status is left untouched: the
    /// caller decides whether the error is fatal.
    pub fn report_error(
        &mut self,
        step_name: &str,
        message: &str,
        error_type: &str,
        retry_count: u32,
        recovery_action: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.error_count += 1;
        self.last_update = now;
        self.push_event(
            now,
            EventKind::Error {
                step_name: step_name.to_string(),
                error_type: error_type.to_string(),
                message: message.to_string(),
                retry_count,
                recovery_action,
                stack_trace: None,
            },
        );
    }

    /// Record a retry attempt. Bookkeeping only.
    pub fn report_retry(
        &mut self,
        step_name: &str,
        retry_count: u32,
        max_retries: u32,
        reason: &str,
        delay: Option<f64>,
        now: DateTime<Utc>,
    ) {
        self.last_update = now;
        self.push_event(
            now,
            EventKind::Retry {
                step_name: step_name.to_string(),
                retry_count,
                max_retries,
                reason: reason.to_string(),
                delay,
            },
        );
    }

    /// Close the run and freeze its progress. A run that is already terminal
    /// keeps its status and progress; only the summary and the timeline grow.
    pub fn complete(&mut self, success: bool, summary: Option<String>, now: DateTime<Utc>) {
        self.closed = true;
        if !self.is_terminal() {
            self.status = ProgressStatus::from_success(success);
            if success {
                self.overall_progress = 100.0;
            }
        }
        if summary.is_some() {
            self.summary = summary.clone();
        }
        self.last_update = now;

        self.push_event(
            now,
            EventKind::RunCompletion {
                name: self.name.clone(),
                status: self.status,
                final_progress: self.overall_progress,
                total_duration: seconds_between(self.start_time, now),
                error_count: self.error_count,
                summary,
            },
        );
    }

    /// Get or create the step with the given name.
    pub(crate) fn step_entry(&mut self, step_name: &str) -> &mut StepState {
        self.steps
            .entry(step_name.to_string())
            .or_insert_with(|| StepState::new(step_name))
    }

    /// Record which step and operation were touched last.
    pub(crate) fn touch(&mut self, step_name: &str, operation: &str, now: DateTime<Utc>) {
        self.current_step = step_name.to_string();
        self.current_operation = operation.to_string();
        self.last_update = now;
    }

    /// Append an event stamped with the run's elapsed time.
    pub fn push_event(&mut self, now: DateTime<Utc>, kind: EventKind) {
        let elapsed = seconds_between(self.start_time, now);
        self.events.push(ProgressEvent::new(
            self.correlation_id.clone(),
            now,
            elapsed,
            kind,
        ));
    }

    /// Re-derive `overall_progress` and `status` from the steps.
    ///
    /// Progress is the mean over declared steps (missing steps count as 0);
    /// with no declared steps or once the run is closed it is left unchanged.
    /// A terminal run status is never changed by derivation.
    pub fn recompute(&mut self) {
        if !self.declared_steps.is_empty() && !self.closed {
            let total: f64 = self
                .declared_steps
                .iter()
                .map(|name| {
                    self.steps
                        .get(name)
                        .map(|step| step.progress_percentage)
                        .unwrap_or(0.0)
                })
                .sum();
            self.overall_progress = clamp_progress(total / self.declared_steps.len() as f64);
        }

        if self.is_terminal() {
            return;
        }

        let any_failed = self
            .steps
            .values()
            .any(|step| step.status == ProgressStatus::Failed);
        let all_declared_completed = !self.declared_steps.is_empty()
            && self.declared_steps.iter().all(|name| {
                self.steps
                    .get(name)
                    .is_some_and(|step| step.status == ProgressStatus::Completed)
            });

        self.status = if any_failed {
            ProgressStatus::Failed
        } else if all_declared_completed {
            ProgressStatus::Completed
        } else {
            ProgressStatus::Running
        };
    }
}

/// Clamp a reported progress value into [0, 100]. NaN counts as 0.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Seconds between two instants as a float, never negative.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = end.signed_duration_since(start).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}
