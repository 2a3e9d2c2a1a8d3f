//! Error types for the somni_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for somni_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an out-of-range or inconsistent value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No session with the given id exists
    #[error("Session {0} not found")]
    NotFound(String),

    /// Subject already has an open session
    #[error("Subject {subject_id} already has an active session ({existing_session_id}); end it before starting a new one")]
    Conflict {
        subject_id: String,
        existing_session_id: String,
    },

    /// Transition not allowed from the session's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Opaque repository failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`] for callers that branch on the category
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    InvalidState,
    Persistence,
    Config,
}

impl Error {
    /// Category of this error.
    ///
    /// Storage-level IO and serialization failures all count as persistence.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::Persistence(_) | Error::Io(_) | Error::Json(_) | Error::Csv(_) => {
                ErrorKind::Persistence
            }
            Error::Toml(_) | Error::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_existing_session() {
        let err = Error::Conflict {
            subject_id: "baby1".into(),
            existing_session_id: "session-1-abcdef".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("baby1"));
        assert!(msg.contains("session-1-abcdef"));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_io_errors_classify_as_persistence() {
        let err: Error = io::Error::new(io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }
}
