//! Client-visible failure reasons.

use std::fmt;

/// Reserved substring marking an expired session.
pub const SESSION_EXPIRED_MARKER: &str = "SESSION_EXP";

/// Reserved substring marking a missing report engine.
pub const NO_REPORT_ENGINE_MARKER: &str = "NO_BIRT";

/// Classified failure reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    /// Login rejected.
    InvalidCredentials,
    /// Constraint violated by an insert or update.
    ConstrViolationOnUpdate,
    /// Constraint violated by a delete.
    ConstrViolationOnDelete,
    /// Session no longer valid.
    SessionExpired,
    /// Database cannot be reached.
    DbmsUnreachable,
    /// Creating a database login failed.
    DbmsCreateUserFailure,
    /// Reports are not available.
    NoReportEngine,
    /// Any other failure.
    Generic,
    /// Failure with no text to show.
    Silent,
}

impl ErrorReason {
    /// Returns the symbolic name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorReason::ConstrViolationOnUpdate => "CONSTR_VIOLATION_ON_UPDATE",
            ErrorReason::ConstrViolationOnDelete => "CONSTR_VIOLATION_ON_DELETE",
            ErrorReason::SessionExpired => "SESSION_EXPIRED",
            ErrorReason::DbmsUnreachable => "DBMS_UNREACHABLE",
            ErrorReason::DbmsCreateUserFailure => "DBMS_CREATEUSER_FAILURE",
            ErrorReason::NoReportEngine => "NO_REPORT_ENGINE",
            ErrorReason::Generic => "GENERIC",
            ErrorReason::Silent => "SILENT",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
