//! Progress Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Server runtime or storage
//!
//! All types here describe a tracked workflow run: its correlation id, the
//! steps it is made of, the events that make up its timeline, and the read
//! model handed to dashboards.

pub mod correlation;
pub mod error;
pub mod event;
pub mod ids;
pub mod run;
pub mod status;
pub mod update;
pub mod view;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{EventKind, ProgressEvent};
pub use ids::CorrelationId;
pub use run::{Run, StepState};
pub use status::ProgressStatus;
pub use update::{ProgressUpdate, UpdateAck};
pub use view::{AggregatedView, StepView};
