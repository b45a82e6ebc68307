//! Server configuration.

use joty_resolver::Dialect;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the Joty server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle time after which a session expires.
    pub session_timeout: Duration,
    /// Whether commands other than `login` need a live session.
    pub require_session: bool,
    /// Dialect used for paged queries.
    pub dialect: Dialect,
    /// Rows per page of a paged query.
    pub page_size: u32,
    /// Whether SQL text that matches no catalog entry may run as is.
    pub allow_literal_sql: bool,
    /// Maximum statements in one batch.
    pub max_batch: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            session_timeout: Duration::from_secs(30 * 60),
            require_session: true,
            dialect: Dialect::sqlite(),
            page_size: 50,
            allow_literal_sql: true,
            max_batch: 1000,
        }
    }

    /// Sets the session idle timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets whether a session is required.
    pub fn with_require_session(mut self, require: bool) -> Self {
        self.require_session = require;
        self
    }

    /// Sets the dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, rows: u32) -> Self {
        self.page_size = rows;
        self
    }

    /// Restricts execution to catalog statements.
    pub fn catalog_only(mut self) -> Self {
        self.allow_literal_sql = false;
        self
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch(mut self, size: usize) -> Self {
        self.max_batch = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
