//! Login authentication.
//!
//! `login` carries `user` and `pwd` in the query string. An [`Authenticator`]
//! turns them into a [`Principal`]; the bundled [`StaticAuthenticator`]
//! keeps SHA-256 digests of the passwords it accepts.

use crate::error::{ServerError, ServerResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Login name.
    pub user: String,
    /// Tenant key, in a shared deployment.
    pub sharing_key: Option<String>,
}

/// Checks login credentials.
pub trait Authenticator: Send + Sync {
    /// Authenticates `user` with `password`.
    fn authenticate(&self, user: &str, password: &str) -> ServerResult<Principal>;
}

/// SHA-256 digest of a password.
pub fn password_digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

/// Lower-case hex form of a digest.
pub fn digest_hex(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_hex(text: &str) -> Option<[u8; 32]> {
    if text.len() != 64 || !text.is_ascii() {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone)]
struct UserEntry {
    digest: [u8; 32],
    sharing_key: Option<String>,
}

/// Authenticator over a fixed user table.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    users: HashMap<String, UserEntry>,
}

impl StaticAuthenticator {
    /// Creates an authenticator that accepts nobody.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user with a clear-text password.
    pub fn with_user(self, user: impl Into<String>, password: &str) -> Self {
        self.with_digest(user, password_digest(password))
    }

    /// Adds a user with a hex SHA-256 password digest.
    pub fn with_user_digest(self, user: impl Into<String>, hex: &str) -> ServerResult<Self> {
        let user = user.into();
        let digest = parse_hex(hex).ok_or_else(|| {
            ServerError::InvalidRequest(format!("bad password digest for {user}"))
        })?;
        Ok(self.with_digest(user, digest))
    }

    /// Adds a user from `user:password[:sharing_key]`.
    pub fn with_user_spec(self, spec: &str) -> ServerResult<Self> {
        let mut parts = spec.splitn(3, ':');
        let (Some(user), Some(password)) = (parts.next(), parts.next()) else {
            return Err(ServerError::InvalidRequest(format!(
                "expected user:password, got {spec:?}"
            )));
        };
        if user.is_empty() {
            return Err(ServerError::InvalidRequest("empty user name".into()));
        }
        let auth = self.with_user(user, password);
        Ok(match parts.next() {
            Some(key) if !key.is_empty() => auth.with_sharing_key(user, key),
            _ => auth,
        })
    }

    /// Assigns a tenant key to an existing user.
    pub fn with_sharing_key(mut self, user: &str, key: impl Into<String>) -> Self {
        if let Some(entry) = self.users.get_mut(user) {
            entry.sharing_key = Some(key.into());
        }
        self
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Returns true if no user is registered.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn with_digest(mut self, user: impl Into<String>, digest: [u8; 32]) -> Self {
        self.users.insert(
            user.into(),
            UserEntry {
                digest,
                sharing_key: None,
            },
        );
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, user: &str, password: &str) -> ServerResult<Principal> {
        let entry = self
            .users
            .get(user)
            .ok_or_else(|| ServerError::AuthenticationFailed(user.to_string()))?;
        if !digests_match(&entry.digest, &password_digest(password)) {
            return Err(ServerError::AuthenticationFailed(user.to_string()));
        }
        Ok(Principal {
            user: user.to_string(),
            sharing_key: entry.sharing_key.clone(),
        })
    }
}
