//! Scripted in-memory backend.
//!
//! Records every call and answers from a script: statements matching a
//! failure pattern fail, inserts receive sequential keys, queries return
//! registered rows. Used by tests and by embedders that stub the database.

use crate::db::{Cell, Connection, ConnectionProvider, DbError, DbResult, Rows};
use parking_lot::Mutex;
use std::sync::Arc;

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryEvent {
    /// A connection was acquired.
    Acquire,
    /// `begin`.
    Begin,
    /// `execute` or `insert_returning_key`, with the final SQL text.
    Execute(String),
    /// `query`.
    Query(String),
    /// `commit`.
    Commit,
    /// `rollback`.
    Rollback,
    /// A connection was dropped.
    Release,
}

#[derive(Debug, Default)]
struct Script {
    events: Vec<MemoryEvent>,
    failures: Vec<(String, DbError)>,
    results: Vec<(String, Rows)>,
    next_key: i64,
    unavailable: Option<DbError>,
}

/// Scripted provider.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    script: Arc<Mutex<Script>>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    /// Creates a provider whose first generated key is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a provider whose first generated key is `first_key`.
    pub fn starting_at(first_key: i64) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                next_key: first_key,
                ..Script::default()
            })),
        }
    }

    /// Fails every statement containing `pattern`.
    pub fn fail_on(&self, pattern: impl Into<String>, error: DbError) {
        self.script.lock().failures.push((pattern.into(), error));
    }

    /// Answers queries containing `pattern` with `rows`.
    pub fn with_rows(&self, pattern: impl Into<String>, rows: Rows) {
        self.script.lock().results.push((pattern.into(), rows));
    }

    /// Makes `acquire` fail.
    pub fn set_unavailable(&self, error: Option<DbError>) {
        self.script.lock().unavailable = error;
    }

    /// Every recorded call.
    pub fn events(&self) -> Vec<MemoryEvent> {
        self.script.lock().events.clone()
    }

    /// SQL of every `execute`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.script
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                MemoryEvent::Execute(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clears the recorded calls.
    pub fn clear_events(&self) {
        self.script.lock().events.clear();
    }
}

impl ConnectionProvider for MemoryProvider {
    fn acquire(&self) -> DbResult<Box<dyn Connection>> {
        let mut script = self.script.lock();
        if let Some(err) = &script.unavailable {
            return Err(err.clone());
        }
        script.events.push(MemoryEvent::Acquire);
        Ok(Box::new(MemoryConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct MemoryConnection {
    script: Arc<Mutex<Script>>,
}

impl MemoryConnection {
    fn record(&self, event: MemoryEvent) -> DbResult<()> {
        let mut script = self.script.lock();
        let sql = match &event {
            MemoryEvent::Execute(sql) | MemoryEvent::Query(sql) => Some(sql.clone()),
            _ => None,
        };
        script.events.push(event);
        if let Some(sql) = sql {
            if let Some((_, err)) = script.failures.iter().find(|(p, _)| sql.contains(p.as_str())) {
                return Err(err.clone());
            }
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn execute(&mut self, sql: &str, _blobs: &[Vec<u8>]) -> DbResult<u64> {
        self.record(MemoryEvent::Execute(sql.to_string()))?;
        Ok(1)
    }

    fn insert_returning_key(&mut self, sql: &str, blobs: &[Vec<u8>]) -> DbResult<String> {
        self.execute(sql, blobs)?;
        let mut script = self.script.lock();
        let key = script.next_key;
        script.next_key += 1;
        Ok(key.to_string())
    }

    fn fetch_generated_id(&mut self, table: &str, field: &str) -> DbResult<String> {
        let mut script = self.script.lock();
        let key = script.next_key;
        script.next_key += 1;
        script
            .events
            .push(MemoryEvent::Query(format!("generated {table}.{field}")));
        Ok(key.to_string())
    }

    fn query(&mut self, sql: &str) -> DbResult<Rows> {
        self.record(MemoryEvent::Query(sql.to_string()))?;
        let script = self.script.lock();
        Ok(script
            .results
            .iter()
            .find(|(p, _)| sql.contains(p.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_else(|| Rows::new(vec!["result".into()])))
    }

    fn begin(&mut self) -> DbResult<()> {
        self.record(MemoryEvent::Begin)
    }

    fn commit(&mut self) -> DbResult<()> {
        self.record(MemoryEvent::Commit)
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.record(MemoryEvent::Rollback)
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.script.lock().events.push(MemoryEvent::Release);
    }
}

/// Builds one-column rows, for scripting.
pub fn single_column(name: &str, values: &[&str]) -> Rows {
    let mut rows = Rows::new(vec![name.to_string()]);
    for v in values {
        rows.rows.push(vec![Cell::Text((*v).to_string())]);
    }
    rows
}
