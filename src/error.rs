//! Error types for cluster lifecycle operations

use thiserror::Error;

/// Main error type for provisioning operations
///
/// Variants form the error taxonomy surfaced to callers: validation
/// problems, missing cloud resources, precondition failures, duplicate
/// registrations, unexpected provider responses, unsupported features and
/// wrapped transport failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request or one of its parameters is invalid
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cloud or cluster resource could not be found
    #[error("not found: {0}")]
    NotFound(String),

    /// The environment is not in the state the operation requires
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The request identifier is already being tracked
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The provider returned an unexpected shape or the operation failed internally
    #[error("internal error: {0}")]
    Internal(String),

    /// The requested capability is not implemented
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Wrapped transport error
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Create an invalid argument error with the given message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a failed precondition error with the given message
    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    /// Create an already exists error with the given message
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an unimplemented error with the given message
    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::Unimplemented(msg.into())
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        Self::Internal(format!("kubernetes error: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Unknown(format!("transport error: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("io error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_variants() {
        match Error::invalid_argument("num_nodes must be positive") {
            Error::InvalidArgument(msg) => assert_eq!(msg, "num_nodes must be positive"),
            _ => panic!("expected InvalidArgument variant"),
        }
        match Error::already_exists("request is already being processed") {
            Error::AlreadyExists(_) => {}
            _ => panic!("expected AlreadyExists variant"),
        }
    }

    #[test]
    fn display_includes_category_and_message() {
        let err = Error::not_found("unable to find target DNS zone");
        assert!(err.to_string().contains("not found"));
        assert!(err.to_string().contains("DNS zone"));

        let err = Error::unimplemented("cancel is not supported");
        assert!(err.to_string().starts_with("unimplemented"));
    }

    #[test]
    fn io_errors_become_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        match Error::from(io) {
            Error::Internal(msg) => assert!(msg.contains("missing file")),
            _ => panic!("expected Internal variant"),
        }
    }
}
