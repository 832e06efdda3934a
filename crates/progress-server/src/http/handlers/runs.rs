//! Run query and eviction handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::error;

use progress_core::{CorrelationId, ProgressEvent};

use crate::http::responses::{ErrorResponse, EvictResponse, EventsQuery};
use crate::state::AppState;

fn not_found(correlation_id: &CorrelationId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::run_not_found(correlation_id.as_str())),
    )
        .into_response()
}

/// Aggregated views of all runs.
pub async fn list_views(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.list_views().await)
}

/// Aggregated view of one run.
pub async fn get_view(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
) -> Response {
    let correlation_id = CorrelationId::new(correlation_id);
    match state.tracker.get_aggregated_view(&correlation_id).await {
        Some(view) => Json(view).into_response(),
        None => not_found(&correlation_id),
    }
}

/// Encoded timeline of one run, optionally filtered by event type.
pub async fn get_events(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let correlation_id = CorrelationId::new(correlation_id);
    let Some(run) = state.tracker.get_run(&correlation_id).await else {
        return not_found(&correlation_id);
    };

    let encoded: Result<Vec<Value>, _> = run
        .events
        .iter()
        .filter(|event| {
            query
                .event_type
                .as_deref()
                .map_or(true, |wanted| event.event_type() == wanted)
        })
        .map(ProgressEvent::encode)
        .collect();

    match encoded {
        Ok(events) => Json(events).into_response(),
        Err(e) => {
            error!(correlation_id = %correlation_id, error = %e, "Failed to encode timeline");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Tracker counters.
pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.tracker.stats().await)
}

/// Remove a run regardless of its status.
pub async fn evict_run(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
) -> Response {
    let correlation_id = CorrelationId::new(correlation_id);
    if !state.tracker.evict_run(&correlation_id).await {
        return not_found(&correlation_id);
    }
    Json(EvictResponse {
        correlation_id: correlation_id.into_inner(),
        evicted: true,
    })
    .into_response()
}
