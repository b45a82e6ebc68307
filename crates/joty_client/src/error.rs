//! Error types for the client engine.

use joty_protocol::{ErrorReason, ProtocolError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to a Joty server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Response document could not be read.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Server answered with a failure outcome.
    #[error("{reason}: {message}")]
    Rejected {
        /// Classified reason.
        reason: ErrorReason,
        /// Reason text sent by the server.
        message: String,
        /// DBMS error code, when the server forwarded one.
        code: Option<i64>,
    },

    /// The caller used the client out of order.
    #[error("usage error: {0}")]
    Usage(String),
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Classified reason of a server failure.
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            ClientError::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the session must be re-established before retrying.
    pub fn is_session_expired(&self) -> bool {
        self.reason() == Some(ErrorReason::SessionExpired)
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { retryable, .. } => *retryable,
            ClientError::Timeout => true,
            ClientError::Rejected { reason, .. } => *reason == ErrorReason::DbmsUnreachable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(reason: ErrorReason) -> ClientError {
        ClientError::Rejected {
            reason,
            message: "text".into(),
            code: None,
        }
    }

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport_retryable("connection reset").is_retryable());
        assert!(!ClientError::transport_fatal("bad url").is_retryable());
        assert!(ClientError::Timeout.is_retryable());
        assert!(rejected(ErrorReason::DbmsUnreachable).is_retryable());
        assert!(!rejected(ErrorReason::ConstrViolationOnUpdate).is_retryable());
        assert!(!ClientError::Usage("no transaction".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ClientError::Rejected {
            reason: ErrorReason::ConstrViolationOnUpdate,
            message: "UNIQUE constraint failed: accounts.name".into(),
            code: Some(2067),
        };
        assert_eq!(
            err.to_string(),
            "CONSTR_VIOLATION_ON_UPDATE: UNIQUE constraint failed: accounts.name"
        );
        assert_eq!(ClientError::Timeout.to_string(), "request timed out");
        assert!(rejected(ErrorReason::SessionExpired).is_session_expired());
    }
}
