//! Error types for the Joty server.

use crate::db::DbError;
use joty_protocol::{ProtocolError, NO_REPORT_ENGINE_MARKER, SESSION_EXPIRED_MARKER};
use joty_resolver::ResolverError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the Joty server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed request document.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Catalog resolution failed.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// The database rejected a call. Rendered verbatim with its code.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Login rejected.
    #[error("invalid credentials: {0}")]
    AuthenticationFailed(String),

    /// Unknown or idle-expired session.
    #[error("session expired")]
    SessionExpired,

    /// `report` without a configured engine.
    #[error("no report engine")]
    NoReportEngine,

    /// Command word the server does not know.
    #[error("unrecognized command: {0}")]
    UnknownCommand(String),

    /// A statement resolved to nothing.
    #[error("unresolved statement: {0}")]
    Unresolved(String),

    /// Method bridge failure.
    #[error("method call failed: {0}")]
    Method(String),

    /// A verify expression rejected the statement.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Report rendering failed.
    #[error("report failed: {0}")]
    Report(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::Protocol(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::SessionExpired
                | ServerError::UnknownCommand(_)
                | ServerError::Unresolved(_)
                | ServerError::Validation(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            ServerError::Database(_)
                | ServerError::NoReportEngine
                | ServerError::Internal(_)
                | ServerError::Io(_)
        )
    }

    /// Reason text and code carried in `<Result>`.
    ///
    /// Database failures keep the DBMS text and native code so the client
    /// can classify them. Session expiry and a missing report engine use
    /// their reserved markers with no code.
    pub fn reason(&self) -> (String, Option<i64>) {
        match self {
            ServerError::Database(err) => (err.message.clone(), err.code),
            ServerError::SessionExpired => (SESSION_EXPIRED_MARKER.to_string(), None),
            ServerError::NoReportEngine => (NO_REPORT_ENGINE_MARKER.to_string(), None),
            other => (other.to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::SessionExpired.is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
        assert!(ServerError::Database(DbError::message("locked")).is_server_error());
    }

    #[test]
    fn reasons() {
        assert_eq!(
            ServerError::SessionExpired.reason(),
            ("SESSION_EXP".to_string(), None)
        );
        assert_eq!(ServerError::NoReportEngine.reason(), ("NO_BIRT".to_string(), None));
        assert_eq!(
            ServerError::Database(DbError::new("UNIQUE constraint failed: t.name", 2067)).reason(),
            ("UNIQUE constraint failed: t.name".to_string(), Some(2067))
        );
        let (text, code) = ServerError::AuthenticationFailed("ann".into()).reason();
        assert!(text.contains("invalid credentials"));
        assert_eq!(code, None);
        let (text, _) = ServerError::UnknownCommand("fly".into()).reason();
        assert_eq!(text, "unrecognized command: fly");
    }
}
