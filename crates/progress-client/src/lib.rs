//! Progress client library.
//!
//! Lets a remote service report the progress of its part of a run to the
//! progress server, and read the run's aggregated view back.

pub mod error;
pub mod http;
pub mod reporter;

pub use error::ClientError;
pub use http::HttpClient;
pub use reporter::ProgressReporter;
