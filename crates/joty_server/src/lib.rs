//! # Joty Server
//!
//! Server side of the Joty posted-statement protocol.
//!
//! This crate provides:
//! - Request dispatch for `login`, `query`, `report`, `trans`, `exec`, `end`
//! - The batch executor: sequential statements, generated-id propagation,
//!   compensation of non-transactional side effects
//! - The method bridge: named handlers registered at startup
//! - Sessions and login authentication
//! - Database seams with a SQLite backend and a scripted in-memory backend
//! - An axum HTTP front
//!
//! # Architecture
//!
//! [`JotyServer`] wraps a [`RequestHandler`] over a shared
//! [`HandlerContext`]: configuration, the resolver catalog, the method
//! registry, a [`ConnectionProvider`] and the session table. Each request
//! acquires its own connection and parameter context; the catalog and the
//! registry are read-only and shared.
//!
//! # Failures
//!
//! Nothing crosses the wire as an unhandled fault. Database failures are
//! forwarded with the DBMS text and code for the client to classify;
//! session expiry and a missing report engine use the reserved markers
//! `SESSION_EXP` and `NO_BIRT`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod db;
mod error;
mod executor;
mod handler;
pub mod http;
mod memory;
mod method;
mod report;
mod server;
mod session;
mod sqlite;
mod validator;

pub use auth::{digest_hex, password_digest, Authenticator, Principal, StaticAuthenticator};
pub use config::ServerConfig;
pub use db::{Cell, Connection, ConnectionProvider, DbError, DbResult, Rows};
pub use error::{ServerError, ServerResult};
pub use executor::{BatchExecutor, BatchOutcome};
pub use handler::{HandlerContext, IncomingRequest, RequestHandler};
pub use memory::{single_column, MemoryEvent, MemoryProvider};
pub use method::{MethodCall, MethodHandler, MethodOutput, MethodRegistry, MethodSpec};
pub use report::ReportEngine;
pub use server::JotyServer;
pub use session::{Clock, ManualClock, Session, SessionStore, SystemClock};
pub use sqlite::{SqliteConnection, SqliteProvider};
pub use validator::{EmptyResultValidator, Validator};
