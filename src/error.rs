//! Nearby session error types.
//!
//! # Error Classification
//!
//! Nothing in the session core is fatal to the process. Errors fall into
//! two groups:
//!
//! - **Guard violations** raised by a direct user command (`DuplicateRequest`,
//!   `UnknownEndpoint`, `NoActiveConnections`). State is left untouched and the
//!   caller decides how to display them.
//! - **Integrity failures** raised while applying adapter events
//!   (`ProtocolViolation`). The offending event is dropped and logged; the
//!   tracked state is left exactly as it was.
//!
//! Terminal negotiation outcomes (failed, rejected, canceled) are not errors
//! of the core and are reported through
//! [`NegotiationOutcome`](crate::negotiation::NegotiationOutcome) instead.

use thiserror::Error;

/// Nearby session errors.
#[derive(Error, Debug)]
pub enum NearbyError {
    /// A connection request is already live for this endpoint.
    ///
    /// Informational: the original negotiation is left untouched.
    #[error("Duplicate connection request for endpoint {0}")]
    DuplicateRequest(String),

    /// The endpoint is not known to the session (or has no pending request).
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A payload was sent with no established connection among its targets.
    #[error("No active connections to send to")]
    NoActiveConnections,

    /// The transport delivered an event inconsistent with tracked state.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The transport refused a command synchronously.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session owner task is gone or did not answer.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NearbyError {
    /// Whether this error is an informational notice rather than a failure.
    pub fn is_recoverable_notice(&self) -> bool {
        matches!(self, NearbyError::DuplicateRequest(_))
    }
}

/// Result type alias for Nearby operations
pub type Result<T> = std::result::Result<T, NearbyError>;

impl From<toml::de::Error> for NearbyError {
    fn from(err: toml::de::Error) -> Self {
        NearbyError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for NearbyError {
    fn from(err: toml::ser::Error) -> Self {
        NearbyError::Config(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for NearbyError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        NearbyError::Runtime("session owner task has stopped".to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for NearbyError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        NearbyError::Runtime("session owner task dropped the reply".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_request_is_notice() {
        assert!(NearbyError::DuplicateRequest("E1".into()).is_recoverable_notice());
        assert!(!NearbyError::UnknownEndpoint("E1".into()).is_recoverable_notice());
        assert!(!NearbyError::NoActiveConnections.is_recoverable_notice());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            NearbyError::UnknownEndpoint("E9".into()).to_string(),
            "Unknown endpoint: E9"
        );
        assert_eq!(
            NearbyError::NoActiveConnections.to_string(),
            "No active connections to send to"
        );
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err: NearbyError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert!(matches!(err, NearbyError::Config(_)));
    }
}
