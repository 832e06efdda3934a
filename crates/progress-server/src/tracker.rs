//! Progress tracker - the stateful core.
//!
//! All runs live in a single map behind one `RwLock`. Every mutating
//! operation takes the write lock once and, inside that critical section,
//! appends its events, mutates the run and re-derives the aggregates. Reads
//! take the read lock for the duration of a snapshot copy. Nothing inside
//! the lock does I/O; appended events are also published on a broadcast
//! channel, which never blocks.
//!
//! Operations against an unknown correlation id are no-ops that return
//! `false` / `None` / an empty list, so late or duplicate reports from
//! remote contributors are dropped instead of failing the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use progress_core::correlation;
use progress_core::event::{events_for_step, events_of_type};
use progress_core::{CorrelationId, ProgressEvent, ProgressStatus, Run};

use crate::clock::{Clock, SystemClock};

/// Tracker settings.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// How long a terminal run is kept after its last update.
    pub retention_ttl: Duration,

    /// How often the background sweep wakes up.
    pub sweep_interval: Duration,

    /// Capacity of the event broadcast channel.
    pub event_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            retention_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            event_buffer: 1024,
        }
    }
}

/// Counters over the runs currently held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub total: usize,
    /// Runs that are PENDING or RUNNING.
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_events: usize,
    pub total_errors: u64,
    pub retention_ttl_secs: u64,
}

/// Handle of the background retention sweep.
struct Sweeper {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct Inner {
    pub(crate) runs: RwLock<HashMap<CorrelationId, Run>>,
    pub(crate) config: TrackerConfig,
    pub(crate) clock: Arc<dyn Clock>,
    events_tx: broadcast::Sender<ProgressEvent>,
    sweeper: Mutex<Option<Sweeper>>,
}

/// Cheaply clonable handle to a shared tracker.
#[derive(Clone)]
pub struct Tracker {
    pub(crate) inner: Arc<Inner>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker {
    /// Create a tracker using the wall clock.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a tracker with an explicit clock.
    pub fn with_clock(config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                runs: RwLock::new(HashMap::new()),
                config,
                clock,
                events_tx,
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Tracker settings.
    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Subscribe to every event appended from now on, across all runs.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Open a run and return its correlation id.
    ///
    /// Without an explicit id the id bound to the current scope is used, or a
    /// fresh one is generated. Opening an id that already exists is a no-op that
    /// returns the existing id. Starts the retention sweep if needed.
    pub async fn start_run(
        &self,
        correlation_id: Option<CorrelationId>,
        name: &str,
        declared_steps: Vec<String>,
    ) -> CorrelationId {
        let correlation_id = correlation_id
            .or_else(correlation::get)
            .unwrap_or_else(correlation::new_id);

        let mut seen = HashSet::new();
        let declared_steps: Vec<String> = declared_steps
            .into_iter()
            .filter(|step| seen.insert(step.clone()))
            .collect();

        {
            let now = self.inner.clock.now();
            let mut runs = self.inner.runs.write().await;
            if runs.contains_key(&correlation_id) {
                warn!(
                    correlation_id = %correlation_id,
                    "Run already exists, keeping the existing run"
                );
            } else {
                let run = Run::new(correlation_id.clone(), name, declared_steps, now);
                self.publish(&run.events);
                info!(
                    correlation_id = %correlation_id,
                    name = %name,
                    steps = run.declared_steps.len(),
                    "Run started"
                );
                runs.insert(correlation_id.clone(), run);
            }
        }

        self.start_sweeper();
        correlation_id
    }

    /// Mark a step as running.
    pub async fn start_step(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        operation: &str,
    ) -> bool {
        self.mutate(correlation_id, "start_step", |run, now| {
            run.start_step(step_name, operation, now);
        })
        .await
    }

    /// Record step progress (clamped to [0, 100]), optionally for a sub-step.
    pub async fn update_step_progress(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        progress: f64,
        operation: &str,
        sub_step: Option<(&str, f64)>,
    ) -> bool {
        self.mutate(correlation_id, "update_step_progress", |run, now| {
            run.update_step(step_name, progress, operation, sub_step, now);
        })
        .await
    }

    /// Finish a step with success or failure.
    pub async fn complete_step(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        success: bool,
    ) -> bool {
        let applied = self
            .mutate(correlation_id, "complete_step", |run, now| {
                run.complete_step(step_name, success, now);
            })
            .await;
        if applied {
            debug!(correlation_id = %correlation_id, step = %step_name, success, "Step completed");
        }
        applied
    }

    /// Register a sub-step of a step.
    pub async fn start_sub_step(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        sub_step_name: &str,
        operation: &str,
    ) -> bool {
        self.mutate(correlation_id, "start_sub_step", |run, now| {
            run.start_sub_step(step_name, sub_step_name, operation, now);
        })
        .await
    }

    /// Finish a sub-step of a step.
    pub async fn complete_sub_step(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        sub_step_name: &str,
        success: bool,
    ) -> bool {
        self.mutate(correlation_id, "complete_sub_step", |run, now| {
            run.complete_sub_step(step_name, sub_step_name, success, now);
        })
        .await
    }

    /// Record an error against a step. Does not change step status.
    pub async fn report_error(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        message: &str,
        error_type: &str,
        retry_count: Option<u32>,
        recovery_action: Option<String>,
    ) -> bool {
        let applied = self
            .mutate(correlation_id, "report_error", |run, now| {
                run.report_error(
                    step_name,
                    message,
                    error_type,
                    retry_count.unwrap_or(0),
                    recovery_action,
                    now,
                );
            })
            .await;
        if applied {
            warn!(
                correlation_id = %correlation_id,
                step = %step_name,
                error_type = %error_type,
                "{} {}",
                correlation_id.short(),
                message
            );
        }
        applied
    }

    /// Record a retry attempt for a step.
    pub async fn report_retry(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
        retry_count: u32,
        max_retries: u32,
        reason: &str,
        delay: Option<f64>,
    ) -> bool {
        self.mutate(correlation_id, "report_retry", |run, now| {
            run.report_retry(step_name, retry_count, max_retries, reason, delay, now);
        })
        .await
    }

    /// Close a run. Repeated calls keep the first terminal status.
    pub async fn complete_run(
        &self,
        correlation_id: &CorrelationId,
        success: bool,
        summary: Option<String>,
    ) -> bool {
        let applied = self
            .mutate(correlation_id, "complete_run", |run, now| {
                run.complete(success, summary, now);
            })
            .await;
        if applied {
            info!(correlation_id = %correlation_id, success, "Run completed");
        }
        applied
    }

    /// Snapshot of a run.
    pub async fn get_run(&self, correlation_id: &CorrelationId) -> Option<Run> {
        self.inner.runs.read().await.get(correlation_id).cloned()
    }

    /// Returns true if the run is currently held.
    pub async fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.inner.runs.read().await.contains_key(correlation_id)
    }

    /// A run's timeline, empty for an unknown id.
    pub async fn get_events(&self, correlation_id: &CorrelationId) -> Vec<ProgressEvent> {
        self.inner
            .runs
            .read()
            .await
            .get(correlation_id)
            .map(|run| run.events.clone())
            .unwrap_or_default()
    }

    /// Events of one `event_type` from a run's timeline.
    pub async fn get_events_by_type(
        &self,
        correlation_id: &CorrelationId,
        event_type: &str,
    ) -> Vec<ProgressEvent> {
        let runs = self.inner.runs.read().await;
        match runs.get(correlation_id) {
            Some(run) => events_of_type(&run.events, event_type).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Step-level events of one step from a run's timeline.
    pub async fn get_events_for_step(
        &self,
        correlation_id: &CorrelationId,
        step_name: &str,
    ) -> Vec<ProgressEvent> {
        let runs = self.inner.runs.read().await;
        match runs.get(correlation_id) {
            Some(run) => events_for_step(&run.events, step_name).cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of every run held.
    pub async fn list_runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.inner.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        runs
    }

    /// Remove a run regardless of its status. Returns whether it existed.
    pub async fn evict_run(&self, correlation_id: &CorrelationId) -> bool {
        let removed = self.inner.runs.write().await.remove(correlation_id).is_some();
        if removed {
            info!(correlation_id = %correlation_id, "Run evicted");
        }
        removed
    }

    /// Counters over the runs currently held.
    pub async fn stats(&self) -> TrackerStats {
        let runs = self.inner.runs.read().await;
        let mut stats = TrackerStats {
            total: runs.len(),
            retention_ttl_secs: self.inner.config.retention_ttl.as_secs(),
            ..Default::default()
        };
        for run in runs.values() {
            match run.status {
                ProgressStatus::Pending | ProgressStatus::Running => stats.active += 1,
                ProgressStatus::Completed => stats.completed += 1,
                ProgressStatus::Failed => stats.failed += 1,
            }
            stats.total_events += run.events.len();
            stats.total_errors += u64::from(run.error_count);
        }
        stats
    }

    /// Run one retention pass now. Returns the number of evicted runs.
    pub async fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired().await
    }

    /// Start the background retention sweep. Does nothing if it is running
    /// or if no tokio runtime is available.
    pub fn start_sweeper(&self) {
        let mut slot = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime, retention sweep not started");
            return;
        }

        let mut interval = self.inner.config.sweep_interval;
        if interval.is_zero() {
            warn!(
                fallback_secs = MIN_SWEEP_INTERVAL.as_secs(),
                "Zero sweep interval, using fallback"
            );
            interval = MIN_SWEEP_INTERVAL;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(
            Arc::downgrade(&self.inner),
            interval,
            token.clone(),
        ));
        info!(
            interval_secs = interval.as_secs(),
            ttl_secs = self.inner.config.retention_ttl.as_secs(),
            "Retention sweep started"
        );
        *slot = Some(Sweeper { token, handle });
    }

    /// Returns true while the background sweep is running.
    pub fn is_sweeping(&self) -> bool {
        self.inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop the background sweep and wait for it to exit. Safe to call when
    /// it was never started.
    pub async fn shutdown(&self) {
        let sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.token.cancel();
            if let Err(e) = sweeper.handle.await {
                warn!(error = %e, "Retention sweep ended abnormally");
            }
            info!("Retention sweep stopped");
        }
    }

    /// Apply `f` to a run under the write lock, then publish the events it
    /// appended. Returns false for an unknown id.
    pub(crate) async fn mutate<F>(
        &self,
        correlation_id: &CorrelationId,
        operation: &'static str,
        f: F,
    ) -> bool
    where
        F: FnOnce(&mut Run, DateTime<Utc>),
    {
        let now = self.inner.clock.now();
        let mut runs = self.inner.runs.write().await;
        let Some(run) = runs.get_mut(correlation_id) else {
            debug!(
                correlation_id = %correlation_id,
                operation,
                "Unknown correlation id, ignoring"
            );
            return false;
        };

        let before = run.events.len();
        f(run, now);
        self.publish(&run.events[before..]);
        true
    }

    fn publish(&self, events: &[ProgressEvent]) {
        for event in events {
            // No subscribers is fine.
            let _ = self.inner.events_tx.send(event.clone());
        }
    }
}

impl Inner {
    async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.retention_ttl;
        let mut runs = self.runs.write().await;

        let expired: Vec<CorrelationId> = runs
            .values()
            .filter(|run| run.is_terminal())
            .filter(|run| match now.signed_duration_since(run.last_update).to_std() {
                Ok(age) => age > ttl,
                Err(_) => false,
            })
            .map(|run| run.correlation_id.clone())
            .collect();

        for correlation_id in &expired {
            runs.remove(correlation_id);
            debug!(correlation_id = %correlation_id, "Expired run removed");
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = runs.len(), "Retention sweep");
        }
        expired.len()
    }
}

/// Used in place of a zero sweep interval.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

async fn sweep_loop(inner: Weak<Inner>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.sweep_expired().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn steps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn manual_tracker(ttl: Duration) -> (Tracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let config = TrackerConfig {
            retention_ttl: ttl,
            ..Default::default()
        };
        (Tracker::with_clock(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_start_run_initializes_steps() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", steps(&["a", "b"]))
            .await;

        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(id.as_str(), "r1");
        assert_eq!(run.overall_progress, 0.0);
        assert!(run.steps.values().all(|s| s.status == ProgressStatus::Pending));
        assert!(tracker.is_sweeping());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_run_uses_scoped_id_or_generates() {
        let tracker = Tracker::default();
        let id = correlation::scope(CorrelationId::new("ctx-1"), async {
            tracker.start_run(None, "Demo", Vec::new()).await
        })
        .await;
        assert_eq!(id.as_str(), "ctx-1");

        let generated = tracker.start_run(None, "Other", Vec::new()).await;
        assert_ne!(generated, id);
        assert!(tracker.contains(&generated).await);
        assert_eq!(correlation::get(), None);
        tracker.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unscoped_start_runs_get_distinct_ids() {
        let tracker = Tracker::default();
        let a = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.start_run(None, "Request A", Vec::new()).await }
        });
        let b = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.start_run(None, "Request B", Vec::new()).await }
        });
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_ne!(a, b);
        assert_eq!(tracker.get_run(&a).await.unwrap().name, "Request A");
        assert_eq!(tracker.get_run(&b).await.unwrap().name, "Request B");
        assert_eq!(tracker.stats().await.total, 2);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_restart_existing_run_is_noop() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", steps(&["a"]))
            .await;
        tracker.update_step_progress(&id, "a", 30.0, "working", None).await;

        let again = tracker
            .start_run(Some("r1".into()), "Replacement", steps(&["z"]))
            .await;

        let run = tracker.get_run(&again).await.unwrap();
        assert_eq!(run.name, "Demo");
        assert_eq!(run.overall_progress, 30.0);
        assert_eq!(tracker.stats().await.total, 1);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_demo_walkthrough() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", steps(&["a", "b"]))
            .await;

        tracker.start_step(&id, "a", "working").await;
        tracker.update_step_progress(&id, "a", 50.0, "half", None).await;
        assert_eq!(tracker.get_run(&id).await.unwrap().overall_progress, 25.0);

        tracker.complete_step(&id, "a", true).await;
        tracker.complete_step(&id, "b", true).await;
        let run = tracker.get_run(&id).await.unwrap();
        assert_eq!(run.overall_progress, 100.0);
        assert_eq!(run.status, ProgressStatus::Completed);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_error_then_failure() {
        let tracker = Tracker::default();
        let id = tracker.start_run(Some("r2".into()), "Demo", steps(&["x"])).await;

        tracker.start_step(&id, "x", "go").await;
        tracker
            .report_error(&id, "x", "boom", "NetworkError", None, None)
            .await;
        assert_eq!(
            tracker.get_run(&id).await.unwrap().steps["x"].status,
            ProgressStatus::Running
        );
        tracker.complete_step(&id, "x", false).await;

        let run = tracker.get_run(&id).await.unwrap();
        assert!(run.error_count >= 1);
        assert_eq!(run.status, ProgressStatus::Failed);
        assert_eq!(tracker.get_events_by_type(&id, "error").await.len(), 1);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_id_is_ignored() {
        let tracker = Tracker::default();
        let ghost = CorrelationId::new("ghost");

        assert!(!tracker.start_step(&ghost, "a", "go").await);
        assert!(!tracker.update_step_progress(&ghost, "a", 10.0, "x", None).await);
        assert!(!tracker.complete_step(&ghost, "a", true).await);
        assert!(!tracker.report_error(&ghost, "a", "m", "E", None, None).await);
        assert!(!tracker.report_retry(&ghost, "a", 1, 3, "r", None).await);
        assert!(!tracker.complete_run(&ghost, true, None).await);
        assert!(tracker.get_run(&ghost).await.is_none());
        assert!(tracker.get_events(&ghost).await.is_empty());
        assert!(!tracker.evict_run(&ghost).await);
    }

    #[tokio::test]
    async fn test_complete_run_is_idempotent() {
        let tracker = Tracker::default();
        let id = tracker.start_run(Some("r1".into()), "Demo", steps(&["a"])).await;

        tracker.complete_run(&id, true, None).await;
        let first = tracker.get_run(&id).await.unwrap();
        tracker.complete_run(&id, false, Some("again".into())).await;
        let second = tracker.get_run(&id).await.unwrap();

        assert_eq!(second.status, first.status);
        assert_eq!(second.overall_progress, first.overall_progress);
        assert_eq!(second.events.len(), first.events.len() + 1);
        assert_eq!(second.summary.as_deref(), Some("again"));
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_only_appends() {
        let tracker = Tracker::default();
        let id = tracker.start_run(Some("r1".into()), "Demo", steps(&["a"])).await;
        tracker.start_step(&id, "a", "go").await;
        let before = tracker.get_run(&id).await.unwrap();

        tracker.report_retry(&id, "a", 1, 3, "timeout", Some(2.0)).await;

        let after = tracker.get_run(&id).await.unwrap();
        assert_eq!(after.steps, before.steps);
        assert_eq!(after.error_count, before.error_count);
        assert_eq!(after.events.last().unwrap().event_type(), "retry");
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_expired_terminal_runs() {
        let (tracker, clock) = manual_tracker(Duration::from_secs(1));
        let done = tracker.start_run(Some("done".into()), "Demo", steps(&["a"])).await;
        let running = tracker
            .start_run(Some("running".into()), "Demo", steps(&["a"]))
            .await;
        tracker.start_step(&running, "a", "go").await;
        tracker.complete_run(&done, true, None).await;

        assert_eq!(tracker.sweep_expired().await, 0);

        clock.advance(chrono::Duration::days(30));
        assert_eq!(tracker.sweep_expired().await, 1);

        assert!(tracker.get_run(&done).await.is_none());
        assert!(tracker.get_run(&running).await.is_some());
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_sweep_runs_and_stops() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = TrackerConfig {
            retention_ttl: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let tracker = Tracker::with_clock(config, clock.clone());
        let id = tracker.start_run(Some("r1".into()), "Demo", steps(&["a"])).await;
        tracker.complete_run(&id, true, None).await;
        clock.advance(chrono::Duration::seconds(5));

        let evicted = tokio::time::timeout(Duration::from_secs(5), async {
            while tracker.contains(&id).await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(evicted.is_ok());

        tokio::time::timeout(Duration::from_secs(1), tracker.shutdown())
            .await
            .unwrap();
        assert!(!tracker.is_sweeping());
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_falls_back() {
        let config = TrackerConfig {
            sweep_interval: Duration::ZERO,
            ..Default::default()
        };
        let tracker = Tracker::new(config);
        tracker.start_run(Some("r1".into()), "Demo", Vec::new()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tracker.is_sweeping());
        assert!(tracker.contains(&"r1".into()).await);
        tracker.shutdown().await;
        assert!(!tracker.is_sweeping());
    }

    #[tokio::test]
    async fn test_shutdown_without_sweeper_and_idempotent_start() {
        let tracker = Tracker::default();
        tracker.shutdown().await;

        tracker.start_run(Some("a".into()), "A", Vec::new()).await;
        tracker.start_run(Some("b".into()), "B", Vec::new()).await;
        assert!(tracker.is_sweeping());

        tracker.shutdown().await;
        tracker.shutdown().await;
        assert!(!tracker.is_sweeping());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let names: Vec<String> = (0..32).map(|i| format!("step-{i}")).collect();
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Parallel", names.clone())
            .await;

        let mut handles = Vec::new();
        for name in &names {
            let tracker = tracker.clone();
            let id = id.clone();
            let name = name.clone();
            handles.push(tokio::spawn(async move {
                tracker.update_step_progress(&id, &name, 60.0, "working", None).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let run = tracker.get_run(&id).await.unwrap();
        assert!(names.iter().all(|n| run.steps[n].progress_percentage == 60.0));
        assert_eq!(run.overall_progress, 60.0);
        assert_eq!(run.events.len(), names.len() + 1);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_progress_stays_in_bounds() {
        let tracker = Tracker::default();
        let id = tracker
            .start_run(Some("r1".into()), "Demo", steps(&["a", "b", "c"]))
            .await;

        let values = [-20.0, 0.0, 35.5, 250.0, f64::NAN, 99.9, 100.0];
        for (i, value) in values.iter().enumerate() {
            let step = ["a", "b", "c"][i % 3];
            tracker.update_step_progress(&id, step, *value, "tick", None).await;
            let progress = tracker.get_run(&id).await.unwrap().overall_progress;
            assert!((0.0..=100.0).contains(&progress), "out of range: {progress}");
        }
        tracker.complete_step(&id, "a", false).await;
        let progress = tracker.get_run(&id).await.unwrap().overall_progress;
        assert!((0.0..=100.0).contains(&progress));
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscribers_receive_appended_events() {
        let tracker = Tracker::default();
        let mut rx = tracker.subscribe();
        let id = tracker.start_run(Some("r1".into()), "Demo", steps(&["a"])).await;
        tracker.start_step(&id, "a", "go").await;

        assert_eq!(rx.recv().await.unwrap().event_type(), "run_start");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "step_start");
        assert_eq!(event.correlation_id, id);
        tracker.shutdown().await;
    }

    #[tokio::test]
    async fn test_stats_and_eviction() {
        let tracker = Tracker::default();
        let a = tracker.start_run(Some("a".into()), "A", steps(&["x"])).await;
        let b = tracker.start_run(Some("b".into()), "B", steps(&["x"])).await;
        tracker.start_run(Some("c".into()), "C", steps(&["x"])).await;
        tracker.complete_run(&a, true, None).await;
        tracker.complete_run(&b, false, None).await;

        let stats = tracker.stats().await;
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.retention_ttl_secs, 3600);

        assert!(tracker.evict_run(&a).await);
        assert!(!tracker.evict_run(&a).await);
        assert_eq!(tracker.list_runs().await.len(), 2);
        tracker.shutdown().await;
    }
}
