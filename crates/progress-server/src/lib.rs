//! Progress Server Library
//!
//! This crate provides the progress tracker for multi-step workflow runs,
//! the relay that folds remote service reports into those runs, and the HTTP
//! surface dashboards and remote services talk to.

pub mod clock;
pub mod config;
pub mod error;
pub mod global;
pub mod http;
pub mod metrics;
pub mod relay;
pub mod state;
pub mod step;
pub mod tracker;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::TrackerError;
pub use global::{global, install_global};
pub use relay::RemoteProgress;
pub use state::AppState;
pub use step::ItemProgress;
pub use tracker::{Tracker, TrackerConfig, TrackerStats};
