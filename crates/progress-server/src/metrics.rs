//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use crate::state::AppState;
use crate::tracker::TrackerStats;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let stats = state.tracker.stats().await;
    let mut output = String::new();

    collect_run_metrics(&stats, &mut output);
    collect_event_metrics(&stats, &mut output);

    output
}

/// Runs held, by status.
fn collect_run_metrics(stats: &TrackerStats, output: &mut String) {
    writeln!(
        output,
        "# HELP progress_runs_total Number of tracked runs by status"
    )
    .ok();
    writeln!(output, "# TYPE progress_runs_total gauge").ok();
    writeln!(output, "progress_runs_total{{status=\"active\"}} {}", stats.active).ok();
    writeln!(
        output,
        "progress_runs_total{{status=\"completed\"}} {}",
        stats.completed
    )
    .ok();
    writeln!(output, "progress_runs_total{{status=\"failed\"}} {}", stats.failed).ok();
}

/// Timeline and error totals over the runs held.
fn collect_event_metrics(stats: &TrackerStats, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP progress_events_held Number of timeline events held in memory"
    )
    .ok();
    writeln!(output, "# TYPE progress_events_held gauge").ok();
    writeln!(output, "progress_events_held {}", stats.total_events).ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP progress_errors_total Errors reported across the runs held"
    )
    .ok();
    writeln!(output, "# TYPE progress_errors_total gauge").ok();
    writeln!(output, "progress_errors_total {}", stats.total_errors).ok();
}
