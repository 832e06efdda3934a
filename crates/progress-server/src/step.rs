//! Helpers for instrumenting units of work.

use std::future::Future;

use progress_core::error::short_type_name;
use progress_core::CorrelationId;

use crate::tracker::Tracker;

impl Tracker {
    /// Run `work` as step `step_name` of a run.
    ///
    /// The step is started before `work` is polled. On `Ok` the step
    /// completes successfully; on `Err` an error event is recorded and the
    /// step completes as failed before the error is handed back unchanged.
    pub async fn track_step<F, T, E>(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        operation: &str,
        work: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.start_step(correlation_id, step_name, operation).await;
        match work.await {
            Ok(value) => {
                self.complete_step(correlation_id, step_name, true).await;
                Ok(value)
            }
            Err(e) => {
                self.report_error(
                    correlation_id,
                    step_name,
                    &e.to_string(),
                    short_type_name::<E>(),
                    None,
                    None,
                )
                .await;
                self.complete_step(correlation_id, step_name, false).await;
                Err(e)
            }
        }
    }
}

/// Progress over a known number of items within one step.
#[derive(Debug, Clone)]
pub struct ItemProgress {
    tracker: Tracker,
    correlation_id: CorrelationId,
    step_name: String,
    total: usize,
    current: usize,
}

impl ItemProgress {
    pub fn new(
        tracker: Tracker,
        correlation_id: CorrelationId,
        step_name: impl Into<String>,
        total: usize,
    ) -> Self {
        Self {
            tracker,
            correlation_id,
            step_name: step_name.into(),
            total,
            current: 0,
        }
    }

    /// Percentage done; 0 when there are no items.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.current as f64 / self.total as f64 * 100.0
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Set the number of items processed and report it.
    pub async fn update(&mut self, current: usize, operation: &str) {
        self.current = current;
        self.tracker
            .update_step_progress(
                &self.correlation_id,
                &self.step_name,
                self.percentage(),
                operation,
                None,
            )
            .await;
    }

    /// Count one more processed item and report it.
    pub async fn increment(&mut self, operation: &str) {
        self.update(self.current + 1, operation).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::ProgressStatus;

    #[derive(Debug)]
    struct FetchError;

    impl std::fmt::Display for FetchError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "upstream unavailable")
        }
    }

    #[tokio::test]
    async fn test_track_step_success() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", vec!["fetch".to_string()])
            .await;

        let out: Result<u32, FetchError> = tracker
            .track_step(&id, "fetch", "fetching", async { Ok(7) })
            .await;

        assert_eq!(out.unwrap(), 7);
        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(run.steps["fetch"].status, ProgressStatus::Completed);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_track_step_failure_records_error() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", vec!["fetch".to_string()])
            .await;

        let out: Result<u32, FetchError> = tracker
            .track_step(&id, "fetch", "fetching", async { Err(FetchError) })
            .await;

        assert!(out.is_err());
        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(run.steps["fetch"].status, ProgressStatus::Failed);
        assert_eq!(run.status, ProgressStatus::Failed);

        let errors = tracker.get_events_by_type(&id, "error").await;
        assert_eq!(errors.len(), 1);
        let record = errors[0].encode().unwrap();
        assert_eq!(record["error_type"], "FetchError");
        assert_eq!(record["message"], "upstream unavailable");
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_item_progress() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", vec!["items".to_string()])
            .await;

        let mut items = ItemProgress::new(tracker.clone(), id.clone(), "items", 4);
        items.increment("one").await;
        assert_eq!(items.percentage(), 25.0);
        items.update(3, "three").await;

        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(run.steps["items"].progress_percentage, 75.0);

        let empty = ItemProgress::new(tracker.clone(), id, "nothing", 0);
        assert_eq!(empty.percentage(), 0.0);
        tracker.shutdown().await;
    }
}
