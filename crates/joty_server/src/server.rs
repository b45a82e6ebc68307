//! Main Joty server.

use crate::handler::{HandlerContext, IncomingRequest, RequestHandler};
use joty_protocol::{RequestParams, Response};
use std::sync::Arc;

/// The Joty server.
///
/// Transport-independent: [`crate::http::router`] exposes it over HTTP, and
/// embedders or tests can call [`JotyServer::handle`] directly.
///
/// # Example
///
/// ```
/// use joty_resolver::Accessor;
/// use joty_server::{HandlerContext, JotyServer, MemoryProvider, ServerConfig};
/// use std::sync::Arc;
///
/// let context = HandlerContext::new(
///     ServerConfig::default(),
///     Arc::new(Accessor::builder().build().unwrap()),
///     Arc::new(MemoryProvider::new()),
/// );
/// let server = JotyServer::new(context);
/// assert_eq!(server.session_count(), 0);
/// ```
pub struct JotyServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl JotyServer {
    /// Creates a server over a handler context.
    pub fn new(context: HandlerContext) -> Self {
        let context = Arc::new(context);
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Handles a decoded request.
    pub fn handle(&self, request: &IncomingRequest) -> Response {
        self.handler.handle(request)
    }

    /// Handles a raw request: query string, session id and body text.
    /// Returns the response document.
    pub fn handle_text(&self, query: &str, session_id: Option<&str>, body: &str) -> String {
        let mut request = IncomingRequest::new(RequestParams::parse(query), body);
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            request = request.with_session(id);
        }
        self.handle(&request).encode()
    }

    /// Shared handler state.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Number of open sessions.
    pub fn session_count(&self) -> usize {
        self.context.sessions.len()
    }

    /// Sharing-key violations seen so far.
    pub fn sharing_violations(&self) -> u64 {
        self.context.accessor.sharing_violations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuthenticator;
    use crate::config::ServerConfig;
    use crate::memory::MemoryProvider;
    use joty_protocol::{PostStatement, Request, ResponsePayload};
    use joty_resolver::Accessor;

    fn server() -> JotyServer {
        let context = HandlerContext::new(
            ServerConfig::default(),
            Arc::new(Accessor::builder().build().unwrap()),
            Arc::new(MemoryProvider::new()),
        )
        .with_authenticator(Arc::new(StaticAuthenticator::new().with_user("ann", "pw")));
        JotyServer::new(context)
    }

    #[test]
    fn server_lifecycle() {
        let server = server();
        assert_eq!(server.session_count(), 0);
        assert_eq!(server.sharing_violations(), 0);
    }

    #[test]
    fn text_round_trip() {
        let server = server();
        let login = Response::decode(&server.handle_text("command=login&user=ann&pwd=pw", None, ""))
            .unwrap();
        assert!(login.is_ok());
        assert_eq!(server.session_count(), 1);

        let body = Request::statements(vec![
            PostStatement::sql("INSERT INTO t VALUES(1)").with_auto_id("id")
        ])
        .encode();
        let text = server.handle_text("command=trans", Some(&login.session_id), &body);
        let response = Response::decode(&text).unwrap();
        assert_eq!(response.payload, ResponsePayload::GenIds(vec!["1".into()]));
    }
}
