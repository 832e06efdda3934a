//! Server-sent event stream of a run's timeline.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use progress_core::{CorrelationId, ProgressEvent};

use crate::http::responses::ErrorResponse;
use crate::state::AppState;

type SseEventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Stream a run's events as SSE.
///
/// The existing timeline is replayed first, then live events follow as they
/// are appended. Each SSE event is named after its `event_type`; the stream
/// ends after `run_completion`.
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
    Path(correlation_id): Path<String>,
) -> Response {
    let correlation_id = CorrelationId::new(correlation_id);

    // Subscribe before taking the snapshot so nothing falls in between.
    let receiver = state.tracker.subscribe();
    let Some(run) = state.tracker.get_run(&correlation_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::run_not_found(correlation_id.as_str())),
        )
            .into_response();
    };

    debug!(correlation_id = %correlation_id, backlog = run.events.len(), "SSE client attached");
    let finished = run.events.iter().any(ProgressEvent::is_run_completion);
    let replay = stream::iter(run.events.into_iter().map(|event| to_sse(&event)));

    let sse_stream: SseEventStream = if finished {
        Box::pin(replay)
    } else {
        Box::pin(replay.chain(live_stream(receiver, correlation_id)))
    };

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Live events of one run, ending after its `run_completion`.
fn live_stream(
    receiver: broadcast::Receiver<ProgressEvent>,
    correlation_id: CorrelationId,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    // State for unfold: (receiver, correlation_id, terminated)
    stream::unfold(
        (receiver, correlation_id, false),
        |(mut receiver, correlation_id, terminated)| async move {
            if terminated {
                return None;
            }

            loop {
                match receiver.recv().await {
                    Ok(event) if event.correlation_id == correlation_id => {
                        let done = event.is_run_completion();
                        return Some((to_sse(&event), (receiver, correlation_id, done)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            correlation_id = %correlation_id,
                            skipped = n,
                            "SSE consumer lagged, skipping events"
                        );
                        return Some((
                            Ok(Event::default().comment(format!("skipped {} events", n))),
                            (receiver, correlation_id, false),
                        ));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    )
}

/// Convert a ProgressEvent to an SSE Event.
fn to_sse(event: &ProgressEvent) -> Result<Event, Infallible> {
    let sse = event
        .encode()
        .map_err(|e| e.to_string())
        .and_then(|record| {
            Event::default()
                .event(event.event_type())
                .json_data(record)
                .map_err(|e| e.to_string())
        });

    Ok(sse.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode event for SSE");
        Event::default().comment("unencodable event")
    }))
}
