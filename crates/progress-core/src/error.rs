//! Core domain errors.

use thiserror::Error;

/// Core domain errors for progress tracking.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An encoded event could not be decoded: unknown `event_type`, or a
    /// required field is missing or has the wrong type.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Short name of a type, used as the `error_type` of reported errors.
///
/// Module path and generic arguments are dropped: `std::io::Error` gives
/// `Error`, `Box<dyn std::error::Error>` gives `Box`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FetchError;

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<std::io::Error>(), "Error");
        assert_eq!(short_type_name::<FetchError>(), "FetchError");
        assert_eq!(short_type_name::<Box<dyn std::error::Error>>(), "Box");
        assert_eq!(short_type_name::<String>(), "String");
    }
}
