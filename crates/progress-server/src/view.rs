//! Read-only views over tracked runs.

use progress_core::{AggregatedView, CorrelationId};

use crate::tracker::Tracker;

impl Tracker {
    /// Snapshot view of one run, computed under a single read lock.
    pub async fn get_aggregated_view(&self, correlation_id: &CorrelationId) -> Option<AggregatedView> {
        let now = self.inner.clock.now();
        let runs = self.inner.runs.read().await;
        runs.get(correlation_id)
            .map(|run| AggregatedView::from_run(run, now))
    }

    /// Views of every run, oldest first.
    pub async fn list_views(&self) -> Vec<AggregatedView> {
        let now = self.inner.clock.now();
        let runs = self.inner.runs.read().await;
        let mut views: Vec<AggregatedView> = runs
            .values()
            .map(|run| AggregatedView::from_run(run, now))
            .collect();
        views.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        views
    }
}
