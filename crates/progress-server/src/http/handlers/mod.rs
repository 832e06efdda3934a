//! HTTP request handlers.

mod health;
mod runs;
mod stream;
mod update;

pub use health::{health_check, metrics_handler};
pub use runs::{evict_run, get_events, get_stats, get_view, list_views};
pub use stream::stream_events;
pub use update::receive_update;
