//! Login sessions.
//!
//! # Invariants
//!
//! - A session id is handed out once and never reused
//! - A session idle for longer than the timeout is gone: touching it removes
//!   it and reports [`ServerError::SessionExpired`]

use crate::auth::Principal;
use crate::error::{ServerError, ServerResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Time source for session expiry.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// The system monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock moved by hand.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

/// A live session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session id.
    pub id: String,
    /// Logged-in user.
    pub user: String,
    /// Tenant key, in a shared deployment.
    pub sharing_key: Option<String>,
    last_seen: Instant,
}

/// Session table.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Creates a store on the system clock.
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    /// Creates a store on the given clock.
    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            timeout,
            clock,
        }
    }

    /// Opens a session for an authenticated user.
    pub fn open(&self, principal: &Principal) -> Session {
        let session = Session {
            id: Uuid::new_v4().simple().to_string().to_uppercase(),
            user: principal.user.clone(),
            sharing_key: principal.sharing_key.clone(),
            last_seen: self.clock.now(),
        };
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        info!(user = %session.user, session = %session.id, "session opened");
        session
    }

    /// Looks a session up and marks it used.
    pub fn touch(&self, id: &str) -> ServerResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(id) else {
            return Err(ServerError::SessionExpired);
        };
        if now.saturating_duration_since(session.last_seen) > self.timeout {
            sessions.remove(id);
            info!(session = id, "session expired");
            return Err(ServerError::SessionExpired);
        }
        session.last_seen = now;
        Ok(session.clone())
    }

    /// Ends a session. Returns false if it was not open.
    pub fn close(&self, id: &str) -> bool {
        let closed = self.sessions.write().remove(id).is_some();
        if closed {
            info!(session = id, "session closed");
        }
        closed
    }

    /// Drops every idle session. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= self.timeout);
        before - sessions.len()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
