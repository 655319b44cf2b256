//! Server error types.

use ctxware_core::CapabilitySet;
use thiserror::Error;

/// Errors raised while starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured address is invalid or could not be bound.
    #[error("bind error: {0}")]
    BindError(String),

    /// The endpoint assumes capabilities this transport does not seed.
    #[error("endpoint assumes capabilities the transport does not provide: {missing}")]
    UnsatisfiedCapabilities {
        /// Assumed tags missing from the transport's set.
        missing: CapabilitySet,
    },

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::BindError("address in use".to_string());
        assert_eq!(err.to_string(), "bind error: address in use");

        let err = ServerError::UnsatisfiedCapabilities {
            missing: CapabilitySet::from_iter(["tenant"]),
        };
        assert!(err.to_string().ends_with("{tenant}"));

        let err = ServerError::from(std::io::Error::other("reset"));
        assert!(err.to_string().contains("reset"));
    }
}
