//! SQLite backend.

use crate::db::{Cell, Connection, ConnectionProvider, DbError, DbResult, Rows};
use rusqlite::types::ValueRef;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

fn map_err(err: rusqlite::Error) -> DbError {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => DbError::new(
            message.unwrap_or_else(|| failure.to_string()),
            i64::from(failure.extended_code),
        ),
        other => DbError::message(other.to_string()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Opens one SQLite connection per acquisition on a database file.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteProvider {
    /// Creates a provider for `path`, checking that the file can be opened.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let provider = Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_secs(5),
        };
        provider.connect()?;
        Ok(provider)
    }

    /// Sets how long a connection waits on a locked database.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Runs a schema script once.
    pub fn init_schema(&self, script: &str) -> DbResult<()> {
        self.connect()?.execute_batch(script).map_err(map_err)
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> DbResult<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path).map_err(map_err)?;
        conn.busy_timeout(self.busy_timeout).map_err(map_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(map_err)?;
        Ok(conn)
    }
}

impl ConnectionProvider for SqliteProvider {
    fn acquire(&self) -> DbResult<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection {
            conn: self.connect()?,
        }))
    }
}

/// A SQLite connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    fn run(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<u64> {
        let mut stmt = self.conn.prepare(sql).map_err(map_err)?;
        let wanted = stmt.parameter_count();
        if wanted > blobs.len() {
            return Err(DbError::message(format!(
                "statement expects {wanted} binary parameters, {} supplied",
                blobs.len()
            )));
        }
        let changed = stmt
            .execute(rusqlite::params_from_iter(blobs.iter().take(wanted)))
            .map_err(map_err)?;
        Ok(changed as u64)
    }
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<u64> {
        debug!(sql, "execute");
        self.run(sql, blobs)
    }

    fn insert_returning_key(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<String> {
        debug!(sql, "insert returning key");
        self.run(sql, blobs)?;
        Ok(self.conn.last_insert_rowid().to_string())
    }

    fn fetch_generated_id(&mut self, table: &str, field: &str) -> DbResult<String> {
        let sql = format!(
            "SELECT MAX({}) FROM {}",
            quote_ident(field),
            quote_ident(table)
        );
        let rows = self.query(&sql)?;
        match rows.rows.first().and_then(|r| r.first()) {
            Some(Cell::Integer(n)) => Ok(n.to_string()),
            Some(Cell::Text(s)) => Ok(s.clone()),
            _ => Err(DbError::message(format!("no generated value for {table}.{field}"))),
        }
    }

    fn query(&mut self, sql: &str) -> DbResult<Rows> {
        debug!(sql, "query");
        let mut stmt = self.conn.prepare(sql).map_err(map_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let mut out = Rows::new(columns);
        let mut rows = stmt.query([]).map_err(map_err)?;
        while let Some(row) = rows.next().map_err(map_err)? {
            let mut cells = Vec::with_capacity(width);
            for i in 0..width {
                let cell = match row.get_ref(i).map_err(map_err)? {
                    ValueRef::Null => Cell::Null,
                    ValueRef::Integer(n) => Cell::Integer(n),
                    ValueRef::Real(r) => Cell::Real(r),
                    ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
                };
                cells.push(cell);
            }
            out.rows.push(cells);
        }
        Ok(out)
    }

    fn begin(&mut self) -> DbResult<()> {
        self.conn.execute_batch("BEGIN").map_err(map_err)
    }

    fn commit(&mut self) -> DbResult<()> {
        self.conn.execute_batch("COMMIT").map_err(map_err)
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.conn.execute_batch("ROLLBACK").map_err(map_err)
    }
}
