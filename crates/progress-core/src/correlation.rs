//! Correlation id propagation.
//!
//! The current run's id travels with the logical task that is working on it:
//! [`scope`] binds an id for the duration of a future, [`sync_scope`] for a
//! closure. Both restore the previous binding when they exit, whether the
//! inner code returns, fails or panics. Outside of any scope nothing is
//! bound: [`get`] returns `None` and [`set`] does nothing, so unrelated
//! tasks sharing a worker thread never see each other's id.
//!
//! Spawned tasks do not inherit the binding; wrap the spawned future in
//! [`scope`] to carry it over.
//!
//! At a process boundary the id travels in request headers, see
//! [`extract_from_headers`] and [`inject_into_headers`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;

use crate::ids::CorrelationId;

/// Header set by [`inject_into_headers`].
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Headers searched by [`extract_from_headers`], highest priority first.
pub const HEADER_PRIORITY: [&str; 6] = [
    "x-correlation-id",
    "x-request-id",
    "x-trace-id",
    "correlation-id",
    "request-id",
    "trace-id",
];

tokio::task_local! {
    static CURRENT: RefCell<Option<CorrelationId>>;
}

/// Generate a fresh correlation id.
pub fn new_id() -> CorrelationId {
    CorrelationId::generate()
}

/// Bind `id` for the current logical context.
///
/// Only has an effect inside [`scope`] or [`sync_scope`]; returns whether the
/// id was bound.
pub fn set(id: CorrelationId) -> bool {
    CURRENT
        .try_with(|slot| *slot.borrow_mut() = Some(id))
        .is_ok()
}

/// Remove the binding for the current logical context.
pub fn clear() {
    let _ = CURRENT.try_with(|slot| slot.borrow_mut().take());
}

/// The id bound to the current logical context, if any.
pub fn get() -> Option<CorrelationId> {
    CURRENT.try_with(|slot| slot.borrow().clone()).ok().flatten()
}

/// The current id, or a freshly generated one.
///
/// Inside a scope the new id is bound before returning; outside of one it is
/// returned unbound.
pub fn get_or_create() -> CorrelationId {
    match get() {
        Some(id) => id,
        None => {
            let id = new_id();
            set(id.clone());
            id
        }
    }
}

/// Run `future` with `id` bound, restoring the previous binding afterwards.
pub async fn scope<F>(id: CorrelationId, future: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(RefCell::new(Some(id)), future).await
}

/// Run `f` with `id` bound, restoring the previous binding afterwards.
pub fn sync_scope<F, R>(id: CorrelationId, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT.sync_scope(RefCell::new(Some(id)), f)
}

/// Find a correlation id in request headers.
///
/// Header names are matched case-insensitively following [`HEADER_PRIORITY`];
/// the first non-empty value wins.
pub fn extract_from_headers<I, K, V>(headers: I) -> Option<CorrelationId>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let pairs: Vec<(K, V)> = headers.into_iter().collect();
    HEADER_PRIORITY.iter().find_map(|wanted| {
        pairs.iter().find_map(|(name, value)| {
            let value = value.as_ref().trim();
            (name.as_ref().eq_ignore_ascii_case(wanted) && !value.is_empty())
                .then(|| CorrelationId::new(value))
        })
    })
}

/// Copy of `headers` carrying `id` in the canonical correlation header.
///
/// Any existing spelling of the canonical header is replaced. The input is
/// never modified.
pub fn inject_into_headers(
    headers: &HashMap<String, String>,
    id: &CorrelationId,
) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(CORRELATION_HEADER))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    out.insert(CORRELATION_HEADER.to_string(), id.as_str().to_string());
    out
}
