//! HTTP transport.
//!
//! The engine talks to the server through the [`HttpClient`] trait so the
//! transport can be swapped: [`ReqwestClient`] over the network,
//! [`LoopbackClient`] straight into an in-process server, and
//! [`MockHttpClient`] with scripted responses.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use joty_protocol::{split_session_path, Response};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with an XML body and returns the response body.
    /// Never times out.
    fn post(&self, url: &str, body: String) -> ClientResult<String>;

    /// Sends a GET request and returns the response body. Bounded by the
    /// configured wait timeouts.
    fn get(&self, url: &str) -> ClientResult<String>;
}

/// Blocking reqwest transport.
pub struct ReqwestClient {
    post: Client,
    wait: Client,
}

impl ReqwestClient {
    /// Builds the transport from a client configuration.
    ///
    /// When cookies are enabled both request kinds share one cookie jar, so
    /// the session cookie set by a POST is sent back on a GET.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let mut post = Client::builder().timeout(None::<Duration>);
        let mut wait = Client::builder()
            .connect_timeout(config.wait.connect)
            .timeout(config.wait.read);
        if config.use_cookies {
            let jar = Arc::new(Jar::default());
            post = post.cookie_provider(Arc::clone(&jar));
            wait = wait.cookie_provider(jar);
        }
        Ok(Self {
            post: post.build().map_err(transport_error)?,
            wait: wait.build().map_err(transport_error)?,
        })
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_connect() || err.is_request() {
        ClientError::transport_retryable(err.to_string())
    } else {
        ClientError::transport_fatal(err.to_string())
    }
}

fn read_body(response: reqwest::blocking::Response) -> ClientResult<String> {
    let status = response.status();
    if status.is_server_error() {
        return Err(ClientError::transport_retryable(format!("HTTP {status}")));
    }
    if !status.is_success() {
        return Err(ClientError::transport_fatal(format!("HTTP {status}")));
    }
    response.text().map_err(transport_error)
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: String) -> ClientResult<String> {
        let response = self
            .post
            .post(url)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body)
            .send()
            .map_err(transport_error)?;
        read_body(response)
    }

    fn get(&self, url: &str) -> ClientResult<String> {
        let response = self.wait.get(url).send().map_err(transport_error)?;
        read_body(response)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a raw request (query string, session id, body) and returns
    /// the response document.
    fn handle_text(&self, query: &str, session_id: Option<&str>, body: &str) -> String;
}

impl<F> LoopbackServer for F
where
    F: Fn(&str, Option<&str>, &str) -> String + Send + Sync,
{
    fn handle_text(&self, query: &str, session_id: Option<&str>, body: &str) -> String {
        self(query, session_id, body)
    }
}

/// A client that routes requests directly to an in-process server.
///
/// Behaves like the HTTP front: the session id is taken from the URL path
/// or, failing that, from a cookie remembered from the last response.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    cookie: Mutex<Option<String>>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self {
            server,
            cookie: Mutex::new(None),
        }
    }

    /// The session cookie currently held.
    pub fn cookie(&self) -> Option<String> {
        self.cookie.lock().clone()
    }

    fn exchange(&self, url: &str, body: &str) -> String {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let (_, path_session) = split_session_path(path);
        let session = path_session.map(str::to_string).or_else(|| self.cookie());
        let text = self.server.handle_text(query, session.as_deref(), body);
        if let Ok(response) = Response::decode(&text) {
            if !response.session_id.is_empty() {
                *self.cookie.lock() = Some(response.session_id);
            }
        }
        text
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: String) -> ClientResult<String> {
        Ok(self.exchange(url, &body))
    }

    fn get(&self, url: &str) -> ClientResult<String> {
        Ok(self.exchange(url, ""))
    }
}

/// HTTP method of a recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET, no body.
    Get,
    /// POST with an XML body.
    Post,
}

/// A request seen by [`MockHttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Method used.
    pub method: HttpMethod,
    /// Full URL, query string included.
    pub url: String,
    /// Body text (empty for GET).
    pub body: String,
}

/// Scripted transport for tests.
///
/// Responses are returned in the order they were pushed; every request is
/// recorded.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<ClientResult<String>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpClient {
    /// Creates a mock with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response document.
    pub fn push_response(&self, response: &Response) {
        self.responses.lock().push_back(Ok(response.encode()));
    }

    /// Queues a raw response body.
    pub fn push_text(&self, text: impl Into<String>) {
        self.responses.lock().push_back(Ok(text.into()));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, err: ClientError) {
        self.responses.lock().push_back(Err(err));
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, method: HttpMethod, url: &str, body: String) -> ClientResult<String> {
        self.requests.lock().push(RecordedRequest {
            method,
            url: url.to_string(),
            body,
        });
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::transport_fatal("no scripted response")))
    }
}

impl HttpClient for MockHttpClient {
    fn post(&self, url: &str, body: String) -> ClientResult<String> {
        self.next(HttpMethod::Post, url, body)
    }

    fn get(&self, url: &str) -> ClientResult<String> {
        self.next(HttpMethod::Get, url, String::new())
    }
}
