//! Progress ingress from remote services.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use progress_core::update::{ERROR, STEP_PROGRESS};
use progress_core::{CorrelationId, ProgressUpdate, UpdateAck};

use crate::relay::RemoteProgress;
use crate::state::AppState;

const UNKNOWN: &str = "unknown";

/// Receive a progress update from a remote service and apply it to its run.
///
/// Only malformed bodies and a missing `correlation_id` are rejected. Updates
/// for unknown runs and unknown event types are acknowledged and dropped.
pub async fn receive_update(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProgressUpdate>, JsonRejection>,
) -> Response {
    let update = match payload {
        Ok(Json(update)) => update,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed progress update");
            return (
                StatusCode::BAD_REQUEST,
                Json(UpdateAck::error(rejection.body_text())),
            )
                .into_response();
        }
    };

    let Some(correlation_id) = update.correlation_id().map(CorrelationId::new) else {
        warn!("Progress update received without correlation_id");
        return (
            StatusCode::BAD_REQUEST,
            Json(UpdateAck::error("Missing correlation_id")),
        )
            .into_response();
    };

    let tracker = &state.tracker;
    let event_type = update.event_type.as_str();
    match event_type {
        STEP_PROGRESS => {
            let step = update.step_name.as_deref().unwrap_or(UNKNOWN);
            tracker
                .relay_update(&correlation_id, remote_progress(&update, step))
                .await;
        }
        ERROR => {
            tracker
                .report_error(
                    &correlation_id,
                    update.step_name.as_deref().unwrap_or(UNKNOWN),
                    update.error_message.as_deref().unwrap_or("Unknown error"),
                    update.error_type.as_deref().unwrap_or("RuntimeError"),
                    update.retry_attempt,
                    None,
                )
                .await;
        }
        other => match state.milestone_step(other) {
            Some(step) => {
                tracker
                    .relay_update(&correlation_id, remote_progress(&update, step))
                    .await;
            }
            None => {
                info!(
                    correlation_id = %correlation_id,
                    event_type = %other,
                    "Ignoring progress update with unknown event_type"
                );
                return (StatusCode::OK, Json(UpdateAck::success())).into_response();
            }
        },
    }

    info!(
        correlation_id = %correlation_id,
        event_type = %event_type,
        "Progress update relayed"
    );
    (StatusCode::OK, Json(UpdateAck::success())).into_response()
}

fn remote_progress(update: &ProgressUpdate, step: &str) -> RemoteProgress {
    RemoteProgress::new(
        update.service_name.as_deref().unwrap_or(UNKNOWN),
        step,
        update.progress_percentage.unwrap_or(0.0),
        update.current_operation.as_deref().unwrap_or_default(),
    )
}
