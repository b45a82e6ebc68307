//! Failure classification.
//!
//! The server forwards raw DBMS error text and codes. The client maps them
//! to an [`ErrorReason`] in a fixed order:
//!
//! 1. the `SESSION_EXP` marker
//! 2. the `NO_BIRT` marker
//! 3. the configured [`ExceptionCheck`]
//! 4. empty text is [`ErrorReason::Silent`], anything else
//!    [`ErrorReason::Generic`]

use joty_protocol::{ErrorReason, NO_REPORT_ENGINE_MARKER, SESSION_EXPIRED_MARKER};

/// DBMS-specific recognition of failure text and codes.
pub trait ExceptionCheck: Send + Sync {
    /// Returns the reason for a failure, or `None` when not recognised.
    fn check(&self, message: &str, code: Option<i64>) -> Option<ErrorReason>;
}

#[derive(Debug, Clone)]
struct Rule {
    reason: ErrorReason,
    codes: Vec<i64>,
    patterns: Vec<String>,
}

impl Rule {
    fn matches(&self, message: &str, code: Option<i64>) -> bool {
        code.is_some_and(|c| self.codes.contains(&c))
            || self.patterns.iter().any(|p| message.contains(p.as_str()))
    }
}

/// Rule-based [`ExceptionCheck`]: a rule matches on any of its codes or
/// any of its message substrings (case-insensitive). First match wins.
#[derive(Debug, Clone, Default)]
pub struct PatternExceptionCheck {
    rules: Vec<Rule>,
}

impl PatternExceptionCheck {
    /// Creates a check with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule.
    pub fn with_rule(mut self, reason: ErrorReason, codes: &[i64], patterns: &[&str]) -> Self {
        self.rules.push(Rule {
            reason,
            codes: codes.to_vec(),
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        });
        self
    }

    /// Rules for SQLite extended result codes and messages.
    pub fn sqlite() -> Self {
        Self::new()
            .with_rule(
                ErrorReason::ConstrViolationOnUpdate,
                // UNIQUE, PRIMARYKEY, NOTNULL, CHECK
                &[2067, 1555, 1299, 275],
                &[
                    "unique constraint failed",
                    "not null constraint failed",
                    "check constraint failed",
                ],
            )
            .with_rule(
                ErrorReason::ConstrViolationOnDelete,
                // FOREIGNKEY
                &[787],
                &["foreign key constraint failed"],
            )
            .with_rule(
                ErrorReason::DbmsUnreachable,
                // CANTOPEN
                &[14],
                &["unable to open database"],
            )
            .with_rule(
                ErrorReason::InvalidCredentials,
                // AUTH
                &[23],
                &["invalid credentials"],
            )
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ExceptionCheck for PatternExceptionCheck {
    fn check(&self, message: &str, code: Option<i64>) -> Option<ErrorReason> {
        let message = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&message, code))
            .map(|rule| rule.reason)
    }
}

/// Classifies a failure outcome.
pub fn classify(message: &str, code: Option<i64>, check: &dyn ExceptionCheck) -> ErrorReason {
    if message.contains(SESSION_EXPIRED_MARKER) {
        ErrorReason::SessionExpired
    } else if message.contains(NO_REPORT_ENGINE_MARKER) {
        ErrorReason::NoReportEngine
    } else if let Some(reason) = check.check(message, code) {
        reason
    } else if message.trim().is_empty() {
        ErrorReason::Silent
    } else {
        ErrorReason::Generic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_come_first() {
        let check = PatternExceptionCheck::sqlite();
        assert_eq!(classify("SESSION_EXP", None, &check), ErrorReason::SessionExpired);
        // Marker wins over a code the check would recognise.
        assert_eq!(classify("NO_BIRT", Some(2067), &check), ErrorReason::NoReportEngine);
    }

    #[test]
    fn sqlite_codes_and_messages() {
        let check = PatternExceptionCheck::sqlite();
        assert_eq!(
            classify("UNIQUE constraint failed: accounts.name", Some(2067), &check),
            ErrorReason::ConstrViolationOnUpdate
        );
        assert_eq!(
            classify("FOREIGN KEY constraint failed", None, &check),
            ErrorReason::ConstrViolationOnDelete
        );
        assert_eq!(classify("", Some(14), &check), ErrorReason::DbmsUnreachable);
        assert_eq!(
            classify("invalid credentials: ann", None, &check),
            ErrorReason::InvalidCredentials
        );
    }

    #[test]
    fn fallbacks() {
        let check = PatternExceptionCheck::sqlite();
        assert_eq!(classify("  ", None, &check), ErrorReason::Silent);
        assert_eq!(classify("no such table: t", Some(1), &check), ErrorReason::Generic);
    }

    #[test]
    fn custom_rules() {
        let check = PatternExceptionCheck::new().with_rule(
            ErrorReason::DbmsCreateUserFailure,
            &[],
            &["Cannot Create Login"],
        );
        assert_eq!(check.len(), 1);
        assert_eq!(
            classify("cannot create login 'ann'", None, &check),
            ErrorReason::DbmsCreateUserFailure
        );
        assert!(PatternExceptionCheck::new().is_empty());
    }
}
