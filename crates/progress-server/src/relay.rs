//! Folding progress reported by remote services into local runs.

use std::collections::BTreeMap;

use progress_core::event::EventKind;
use progress_core::run::clamp_progress;
use progress_core::{CorrelationId, ProgressStatus};

use crate::tracker::Tracker;

/// One progress report from a remote contributor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteProgress {
    pub service_name: String,
    pub step_name: String,
    /// Step progress in percent; values of 100 or more complete the step.
    pub progress: f64,
    pub operation: String,
    pub sub_steps: BTreeMap<String, f64>,
}

impl RemoteProgress {
    pub fn new(
        service_name: impl Into<String>,
        step_name: impl Into<String>,
        progress: f64,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            step_name: step_name.into(),
            progress,
            operation: operation.into(),
            sub_steps: BTreeMap::new(),
        }
    }

    pub fn with_sub_step(mut self, name: impl Into<String>, progress: f64) -> Self {
        self.sub_steps.insert(name.into(), progress);
        self
    }
}

impl Tracker {
    /// Apply a remote report to the run in one critical section.
    ///
    /// A report at 100% or more completes the step successfully. Anything
    /// lower starts the step if it never started, then records the progress
    /// and merges the sub-step values. Either way a `remote_update` event is
    /// appended. Unknown ids are ignored.
    pub async fn relay_update(
        &self,
        correlation_id: &CorrelationId,
        update: RemoteProgress,
    ) -> bool {
        self.mutate(correlation_id, "relay_update", |run, now| {
            let step = update.step_name.as_str();
            let operation = update.operation.as_str();
            let progress = clamp_progress(update.progress);

            if progress >= 100.0 {
                run.merge_sub_steps(step, &update.sub_steps);
                run.complete_step(step, true, now);
            } else {
                if !run.step_started(step) {
                    run.start_step(step, operation, now);
                }
                run.update_step(step, progress, operation, None, now);
                run.merge_sub_steps(step, &update.sub_steps);
            }

            let status = run
                .steps
                .get(step)
                .map(|s| s.status)
                .unwrap_or(ProgressStatus::Running);
            run.push_event(
                now,
                EventKind::RemoteUpdate {
                    service_name: update.service_name.clone(),
                    step_name: update.step_name.clone(),
                    progress,
                    operation: update.operation.clone(),
                    status,
                    sub_steps: update
                        .sub_steps
                        .iter()
                        .map(|(name, value)| (name.clone(), clamp_progress(*value)))
                        .collect(),
                },
            );
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_with(tracker: &Tracker, steps: &[&str]) -> CorrelationId {
        tracker
            .start_run(
                Some("r1".into()),
                "Relay",
                steps.iter().map(|s| s.to_string()).collect(),
            )
            .await
    }

    #[tokio::test]
    async fn test_relay_starts_and_updates_step() {
        let tracker = Tracker::default();
        let id = run_with(&tracker, &["crawl"]).await;

        tracker
            .relay_update(
                &id,
                RemoteProgress::new("scraper", "crawl", 40.0, "fetching")
                    .with_sub_step("pages", 25.0),
            )
            .await;

        let run = tracker.get_run(&id).await.unwrap();
        let step = &run.steps["crawl"];
        assert_eq!(step.status, ProgressStatus::Running);
        assert_eq!(step.progress_percentage, 40.0);
        assert_eq!(step.sub_steps["pages"], 25.0);
        assert_eq!(run.overall_progress, 40.0);

        let types: Vec<&str> = run.events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["run_start", "step_start", "step_update", "remote_update"]
        );
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_second_report_does_not_restart() {
        let tracker = Tracker::default();
        let id = run_with(&tracker, &["crawl"]).await;

        tracker
            .relay_update(&id, RemoteProgress::new("scraper", "crawl", 10.0, "a"))
            .await;
        tracker
            .relay_update(&id, RemoteProgress::new("scraper", "crawl", 20.0, "b"))
            .await;

        let starts = tracker.get_events_by_type(&id, "step_start").await;
        assert_eq!(starts.len(), 1);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_full_progress_completes_step() {
        let tracker = Tracker::default();
        let id = run_with(&tracker, &["crawl"]).await;

        tracker
            .relay_update(&id, RemoteProgress::new("scraper", "crawl", 150.0, "done"))
            .await;

        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(run.steps["crawl"].status, ProgressStatus::Completed);
        assert_eq!(run.status, ProgressStatus::Completed);
        let last = run.events.last().unwrap();
        match &last.kind {
            EventKind::RemoteUpdate {
                progress, status, ..
            } => {
                assert_eq!(*progress, 100.0);
                assert_eq!(*status, ProgressStatus::Completed);
            }
            other => panic!("unexpected event {other:?}"),
        }
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_unknown_run_is_dropped() {
        let tracker = Tracker::default();
        let applied = tracker
            .relay_update(
                &CorrelationId::new("missing"),
                RemoteProgress::new("scraper", "crawl", 10.0, "x"),
            )
            .await;
        assert!(!applied);
        assert_eq!(tracker.stats().await.total, 0);
    }
}
