//! # Joty Client
//!
//! Client engine of the Joty posted-statement protocol.
//!
//! This crate provides:
//! - [`WebClient`]: request assembly, transaction building, generated-id
//!   tokens, response parsing and session tracking
//! - Failure classification through a pluggable [`ExceptionCheck`]
//! - An [`HttpClient`] seam with a blocking reqwest transport, an
//!   in-process loopback and a scripted mock
//!
//! ## Requests
//!
//! Commands without a body (`end`) go out as GET, bounded by the wait
//! timeouts of [`ClientConfig`]. Everything else is a POST with an XML
//! body and no timeout.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod check;
mod client;
mod config;
mod error;
mod http;

pub use check::{classify, ExceptionCheck, PatternExceptionCheck};
pub use client::{SessionListener, WebClient};
pub use config::{ClientConfig, WaitTimeouts};
pub use error::{ClientError, ClientResult};
pub use http::{
    HttpClient, HttpMethod, LoopbackClient, LoopbackServer, MockHttpClient, RecordedRequest,
    ReqwestClient,
};
