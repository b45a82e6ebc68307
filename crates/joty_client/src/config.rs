//! Configuration for the client engine.

use std::time::Duration;

/// Timeouts applied to GET requests that wait on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeouts {
    /// Connect timeout.
    pub connect: Duration,
    /// Read timeout.
    pub read: Duration,
}

impl Default for WaitTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(60),
        }
    }
}

/// Configuration for a [`crate::WebClient`].
///
/// POST requests carry transactional work and have no timeout; only GET
/// requests are bounded by [`WaitTimeouts`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, without query string (e.g. `http://host:8080/joty`).
    pub server_url: String,
    /// Whether the session travels in a cookie. When off, the session id
    /// is appended to the URL as `;jsessionid=`.
    pub use_cookies: bool,
    /// Bounds for GET requests.
    pub wait: WaitTimeouts,
}

impl ClientConfig {
    /// Creates a configuration for the given server URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            use_cookies: true,
            wait: WaitTimeouts::default(),
        }
    }

    /// Sets the cookie mode.
    pub fn with_cookies(mut self, use_cookies: bool) -> Self {
        self.use_cookies = use_cookies;
        self
    }

    /// Sets the GET timeouts.
    pub fn with_wait_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.wait = WaitTimeouts { connect, read };
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8080/joty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let config = ClientConfig::new("http://db.local/joty")
            .with_cookies(false)
            .with_wait_timeouts(Duration::from_secs(1), Duration::from_secs(2));
        assert_eq!(config.server_url, "http://db.local/joty");
        assert!(!config.use_cookies);
        assert_eq!(config.wait.read, Duration::from_secs(2));
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert!(config.use_cookies);
        assert_eq!(config.wait, WaitTimeouts::default());
    }
}
