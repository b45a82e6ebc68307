//! Statement validation.
//!
//! A statement carrying a verify expression is checked before it runs. The
//! expression is resolved through the catalog like any statement, then
//! handed to the [`Validator`].

use crate::db::Connection;

/// Checks a resolved verify expression.
pub trait Validator: Send + Sync {
    /// Returns the rejection text when the statement must not run.
    fn validate(&self, expr: &str, conn: &mut dyn Connection) -> Result<(), String>;
}

/// Runs the expression as a query that must return no rows.
///
/// Typical use is a uniqueness or reference check: the expression selects
/// the rows that would conflict.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyResultValidator;

impl Validator for EmptyResultValidator {
    fn validate(&self, expr: &str, conn: &mut dyn Connection) -> Result<(), String> {
        let rows = conn.query(expr).map_err(|e| e.to_string())?;
        if rows.rows.is_empty() {
            Ok(())
        } else {
            Err(format!("{} conflicting row(s) for {expr}", rows.rows.len()))
        }
    }
}
