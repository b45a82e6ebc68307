//! Database seam used by the executor.

use joty_protocol::{encode_binary, FieldDesc, ResultSet};
use std::fmt;

/// Result type for database calls.
pub type DbResult<T> = Result<T, DbError>;

/// A database failure: the DBMS text and its native code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Error text as reported by the database.
    pub message: String,
    /// Native error code, when the database reports one.
    pub code: Option<i64>,
}

impl DbError {
    /// Creates an error with a code.
    pub fn new(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Creates an error without a code.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DbError {}

/// A cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Integer.
    Integer(i64),
    /// Floating point.
    Real(f64),
    /// Text.
    Text(String),
    /// Binary.
    Blob(Vec<u8>),
}

impl Cell {
    /// Text form for the wire. Blobs are base64 when `inline_blob` is set
    /// and NULL otherwise.
    pub fn to_wire(&self, inline_blob: bool) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Integer(n) => Some(n.to_string()),
            Cell::Real(r) => Some(r.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::Blob(bytes) if inline_blob => Some(encode_binary(bytes)),
            Cell::Blob(_) => None,
        }
    }

    fn decimals(&self) -> u32 {
        match self {
            Cell::Real(r) => {
                let text = r.to_string();
                text.split_once('.').map_or(0, |(_, frac)| frac.len() as u32)
            }
            _ => 0,
        }
    }
}

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    /// Column names.
    pub columns: Vec<String>,
    /// Row values, as wide as `columns`.
    pub rows: Vec<Vec<Cell>>,
}

impl Rows {
    /// Creates rows with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, builder style.
    pub fn with_row(mut self, row: Vec<Cell>) -> Self {
        self.rows.push(row);
        self
    }

    /// Converts to a wire result set. Column length is the widest rendered
    /// value; blob columns not named in `small_blobs` render as NULL.
    pub fn into_result_set(self, small_blobs: &[String]) -> ResultSet {
        let inline: Vec<bool> = self
            .columns
            .iter()
            .map(|c| small_blobs.iter().any(|b| b.eq_ignore_ascii_case(c)))
            .collect();
        let mut fields: Vec<FieldDesc> = self
            .columns
            .iter()
            .map(|name| FieldDesc::new(name.clone(), 0, 0))
            .collect();
        let mut set_rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut record = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter_mut().enumerate() {
                let cell = row.get(i).unwrap_or(&Cell::Null);
                let value = cell.to_wire(inline[i]);
                if let Some(v) = &value {
                    field.len = field.len.max(v.chars().count() as u32);
                }
                field.dec = field.dec.max(cell.decimals());
                record.push(value);
            }
            set_rows.push(record);
        }
        let mut set = ResultSet::new(fields);
        for record in set_rows {
            set.push_record(record);
        }
        set
    }
}

/// A database connection, owned by one request at a time.
pub trait Connection: Send {
    /// Executes a statement, binding `blobs` to its `?` parameters in order.
    /// Returns the number of affected rows.
    fn execute(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<u64>;

    /// Executes an insert and returns the key it generated.
    fn insert_returning_key(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<String>;

    /// Reads the most recent value generated for `field` of `table`.
    fn fetch_generated_id(&mut self, table: &str, field: &str) -> DbResult<String>;

    /// Runs a query.
    fn query(&mut self, sql: &str) -> DbResult<Rows>;

    /// Starts a transaction.
    fn begin(&mut self) -> DbResult<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> DbResult<()>;

    /// Rolls the open transaction back.
    fn rollback(&mut self) -> DbResult<()>;
}

/// Hands out connections.
pub trait ConnectionProvider: Send + Sync {
    /// Acquires a connection; dropping it releases it.
    fn acquire(&self) -> DbResult<Box<dyn Connection>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        assert_eq!(DbError::new("busy", 5).to_string(), "busy (code 5)");
        assert_eq!(DbError::message("gone").to_string(), "gone");
    }

    #[test]
    fn result_set_conversion() {
        let rows = Rows::new(vec!["id".into(), "price".into(), "photo".into(), "thumb".into()])
            .with_row(vec![
                Cell::Integer(12),
                Cell::Real(9.75),
                Cell::Blob(vec![1, 2]),
                Cell::Blob(vec![0xff]),
            ])
            .with_row(vec![Cell::Integer(3), Cell::Null, Cell::Null, Cell::Null]);
        let set = rows.into_result_set(&["THUMB".to_string()]);
        assert_eq!(set.fields[0].len, 2);
        assert_eq!(set.fields[1].dec, 2);
        assert_eq!(set.records[0][2], None);
        assert_eq!(set.records[0][3].as_deref(), Some("/w=="));
        assert_eq!(set.records[1][1], None);
    }
}
