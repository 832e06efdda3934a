//! Correlation id middleware.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use progress_core::correlation;

/// Bind the request's correlation id while it is handled.
///
/// The id is taken from the request headers (see
/// [`correlation::extract_from_headers`]) or generated, and is echoed back in
/// the `x-correlation-id` response header.
pub async fn propagate_correlation_id(request: Request, next: Next) -> Response {
    let id = correlation::extract_from_headers(
        request
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
    .unwrap_or_else(correlation::new_id);
    debug!(correlation_id = %id, path = %request.uri().path(), "Request");

    let mut response = correlation::scope(id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response
            .headers_mut()
            .insert(correlation::HEADER_PRIORITY[0], value);
    }
    response
}
