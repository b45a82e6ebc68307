//! Request dispatch.
//!
//! One call per HTTP request: check the session, parse the body, dispatch on
//! the command and render the outcome. Every failure becomes a `Nok`
//! response; nothing escapes as an error.

use crate::auth::{Authenticator, StaticAuthenticator};
use crate::config::ServerConfig;
use crate::db::ConnectionProvider;
use crate::error::{ServerError, ServerResult};
use crate::executor::BatchExecutor;
use crate::method::MethodRegistry;
use crate::report::ReportEngine;
use crate::session::{Clock, Session, SessionStore};
use crate::validator::{EmptyResultValidator, Validator};
use joty_protocol::{
    Command, ParamContext, PostStatement, QueryPayload, Request, RequestBody, RequestParams,
    Response, ResponsePayload,
};
use joty_resolver::{Accessor, RequestContext};
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

/// A request as received from the transport.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// Query-string parameters, including the command.
    pub params: RequestParams,
    /// Session id from the URL or a cookie.
    pub session_id: Option<String>,
    /// Request body; empty for `end`.
    pub body: String,
}

impl IncomingRequest {
    /// Creates a request without a session.
    pub fn new(params: RequestParams, body: impl Into<String>) -> Self {
        Self {
            params,
            session_id: None,
            body: body.into(),
        }
    }

    /// Attaches a session id.
    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }
}

/// Shared state for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Statement catalog.
    pub accessor: Arc<Accessor>,
    /// Method bridge.
    pub methods: Arc<MethodRegistry>,
    /// Database connections.
    pub provider: Arc<dyn ConnectionProvider>,
    /// Login check.
    pub authenticator: Arc<dyn Authenticator>,
    /// Verify-expression check.
    pub validator: Option<Arc<dyn Validator>>,
    /// Report renderer.
    pub reports: Option<Arc<dyn ReportEngine>>,
    /// Open sessions.
    pub sessions: SessionStore,
}

impl HandlerContext {
    /// Creates a context with no methods, no users and no report engine.
    pub fn new(
        config: ServerConfig,
        accessor: Arc<Accessor>,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Self {
        let sessions = SessionStore::new(config.session_timeout);
        Self {
            config,
            accessor,
            methods: Arc::new(MethodRegistry::new()),
            provider,
            authenticator: Arc::new(StaticAuthenticator::new()),
            validator: Some(Arc::new(EmptyResultValidator)),
            reports: None,
            sessions,
        }
    }

    /// Sets the method registry.
    pub fn with_methods(mut self, methods: Arc<MethodRegistry>) -> Self {
        self.methods = methods;
        self
    }

    /// Sets the authenticator.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Sets or removes the validator.
    pub fn with_validator(mut self, validator: Option<Arc<dyn Validator>>) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the report engine.
    pub fn with_report_engine(mut self, engine: Arc<dyn ReportEngine>) -> Self {
        self.reports = Some(engine);
        self
    }

    /// Drives session expiry from `clock`. Drops open sessions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.sessions = SessionStore::with_clock(self.config.session_timeout, clock);
        self
    }

    /// Literal SQL carries no sharing filter, so a keyed session of a shared
    /// deployment is held to catalog statements.
    fn literal_sql_allowed(&self, session: Option<&Session>) -> bool {
        let keyed = session.is_some_and(|s| s.sharing_key.is_some());
        self.config.allow_literal_sql && !(keyed && self.accessor.is_shared())
    }

    fn request_context(&self, session: Option<&Session>) -> RequestContext {
        let ctx = RequestContext::new(self.config.dialect.clone(), self.config.page_size);
        match session.and_then(|s| s.sharing_key.as_deref()) {
            Some(key) => ctx.with_sharing_key(key),
            None => ctx,
        }
    }
}

/// Handler for protocol requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a request. Failures are rendered into the response.
    pub fn handle(&self, request: &IncomingRequest) -> Response {
        let command = &request.params.command;
        let span = info_span!(
            "request",
            command = %command,
            session = request.session_id.as_deref().unwrap_or("")
        );
        let _enter = span.enter();

        let mut session_id = request.session_id.clone().unwrap_or_default();
        match self.dispatch(request, &mut session_id) {
            Ok(payload) => {
                info!("request ok");
                Response::ok(payload).with_session(session_id)
            }
            Err(err) => {
                if err.is_server_error() {
                    error!(error = %err, "request failed");
                } else {
                    warn!(error = %err, "request rejected");
                }
                let (reason, code) = err.reason();
                Response::failure(reason, code).with_session(session_id)
            }
        }
    }

    fn dispatch(
        &self,
        request: &IncomingRequest,
        session_id: &mut String,
    ) -> ServerResult<ResponsePayload> {
        let command = &request.params.command;
        if let Command::Other(word) = command {
            return Err(ServerError::UnknownCommand(word.clone()));
        }
        let session = match command {
            Command::Login | Command::End => None,
            _ => self.session(session_id)?,
        };
        let body = Request::decode(command, &request.body)?;

        match command {
            Command::Login => self.login(&request.params, body, session_id),
            Command::End => {
                if !session_id.is_empty() {
                    self.context.sessions.close(session_id);
                }
                session_id.clear();
                Ok(ResponsePayload::None)
            }
            Command::Query => self.query(body, session.as_ref()),
            Command::Report => self.report(&request.params, body),
            Command::Trans | Command::Exec => {
                self.batch(matches!(command, Command::Trans), body, session.as_ref())
            }
            Command::Other(word) => Err(ServerError::UnknownCommand(word.clone())),
        }
    }

    fn session(&self, id: &str) -> ServerResult<Option<Session>> {
        let required = self.context.config.require_session;
        if id.is_empty() {
            return if required {
                Err(ServerError::SessionExpired)
            } else {
                Ok(None)
            };
        }
        match self.context.sessions.touch(id) {
            Ok(session) => Ok(Some(session)),
            Err(err) if required => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn login(
        &self,
        params: &RequestParams,
        body: Request,
        session_id: &mut String,
    ) -> ServerResult<ResponsePayload> {
        let user = params.get("user").unwrap_or_default();
        let password = params.get("pwd").unwrap_or_default();
        let principal = self.context.authenticator.authenticate(user, password)?;
        let session = self.context.sessions.open(&principal);
        *session_id = session.id.clone();
        self.query(body, Some(&session))
    }

    fn query(&self, body: Request, session: Option<&Session>) -> ServerResult<ResponsePayload> {
        let RequestBody::Query {
            query: Some(query),
            small_blobs,
        } = body.body
        else {
            return Ok(ResponsePayload::None);
        };

        let mut params = ParamContext::new();
        let sql = match &query {
            QueryPayload::Text(text) => {
                let stmt = PostStatement::sql(text.clone());
                self.resolve_query(&stmt, &params, session)?
            }
            QueryPayload::Definition(stmt) => {
                params.bind_items(&stmt.items);
                let request = self.context.request_context(session);
                self.context
                    .accessor
                    .compose_query(stmt, &params, &request)?
                    .ok_or_else(|| ServerError::Unresolved(stmt.sql.clone()))?
            }
        };

        let mut conn = self.context.provider.acquire()?;
        let rows = conn.query(&sql)?;
        Ok(ResponsePayload::Rows(rows.into_result_set(&small_blobs)))
    }

    fn resolve_query(
        &self,
        stmt: &PostStatement,
        params: &ParamContext,
        session: Option<&Session>,
    ) -> ServerResult<String> {
        let resolved = self
            .context
            .accessor
            .resolve_detailed(stmt, params)?
            .ok_or_else(|| ServerError::Unresolved(stmt.sql.clone()))?;
        if resolved.def.is_none() && !self.context.literal_sql_allowed(session) {
            return Err(ServerError::Unresolved(stmt.sql.clone()));
        }
        Ok(resolved.sql)
    }

    fn report(&self, params: &RequestParams, body: Request) -> ServerResult<ResponsePayload> {
        let engine = self
            .context
            .reports
            .as_ref()
            .ok_or(ServerError::NoReportEngine)?;
        let name = params
            .get("name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ServerError::InvalidRequest("report name missing".into()))?;
        let mut ctx = ParamContext::new();
        if let RequestBody::Report(items) = &body.body {
            ctx.bind_items(items);
        }
        let mut conn = self.context.provider.acquire()?;
        let bytes = engine
            .render(name, &ctx, conn.as_mut())
            .map_err(ServerError::Report)?;
        Ok(ResponsePayload::Report(bytes))
    }

    fn batch(
        &self,
        transactional: bool,
        body: Request,
        session: Option<&Session>,
    ) -> ServerResult<ResponsePayload> {
        let RequestBody::Statements(statements) = &body.body else {
            return Err(ServerError::InvalidRequest("statement list expected".into()));
        };
        if statements.len() > self.context.config.max_batch {
            return Err(ServerError::InvalidRequest(format!(
                "too many statements: {} > {}",
                statements.len(),
                self.context.config.max_batch
            )));
        }
        let executor = BatchExecutor::new(&self.context.accessor, &self.context.methods)
            .with_validator(self.context.validator.as_deref())
            .with_literal_sql(self.context.literal_sql_allowed(session));
        let mut params = ParamContext::new();
        let returned = executor
            .execute(
                self.context.provider.as_ref(),
                transactional,
                statements,
                &body.binaries,
                &mut params,
            )
            .into_result()?;
        Ok(ResponsePayload::GenIds(returned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Connection, DbError};
    use crate::memory::{single_column, MemoryEvent, MemoryProvider};
    use crate::session::ManualClock;
    use joty_protocol::Item;
    use joty_resolver::DataDef;
    use std::time::Duration;

    fn create_handler() -> (RequestHandler, MemoryProvider) {
        let provider = MemoryProvider::starting_at(7);
        let accessor = Arc::new(Accessor::builder().build().unwrap());
        let context = HandlerContext::new(
            ServerConfig::default(),
            accessor,
            Arc::new(provider.clone()),
        )
        .with_authenticator(Arc::new(StaticAuthenticator::new().with_user("ann", "pw")));
        (RequestHandler::new(Arc::new(context)), provider)
    }

    fn create_shared_handler() -> (RequestHandler, MemoryProvider) {
        let provider = MemoryProvider::new();
        let accessor = Accessor::builder()
            .statement(DataDef::literal("purge", "DELETE FROM t WHERE tenant = 'a'"))
            .sharing_field("tenant")
            .build()
            .unwrap();
        let users = StaticAuthenticator::new()
            .with_user("ann", "pw")
            .with_sharing_key("ann", "a")
            .with_user("ops", "pw");
        let context = HandlerContext::new(
            ServerConfig::default(),
            Arc::new(accessor),
            Arc::new(provider.clone()),
        )
        .with_authenticator(Arc::new(users));
        (RequestHandler::new(Arc::new(context)), provider)
    }

    fn login(handler: &RequestHandler) -> String {
        login_as(handler, "ann")
    }

    fn login_as(handler: &RequestHandler, user: &str) -> String {
        let params = RequestParams::new(Command::Login)
            .with("user", user)
            .with("pwd", "pw");
        let response = handler.handle(&IncomingRequest::new(params, ""));
        assert!(response.is_ok());
        response.session_id
    }

    fn post(handler: &RequestHandler, command: Command, session: &str, body: &Request) -> Response {
        handler.handle(
            &IncomingRequest::new(RequestParams::new(command), body.encode()).with_session(session),
        )
    }

    #[test]
    fn login_opens_a_session() {
        let (handler, _) = create_handler();
        let id = login(&handler);
        assert!(!id.is_empty());
        assert_eq!(handler.context.sessions.len(), 1);
    }

    #[test]
    fn bad_credentials() {
        let (handler, _) = create_handler();
        let params = RequestParams::new(Command::Login)
            .with("user", "ann")
            .with("pwd", "nope");
        let response = handler.handle(&IncomingRequest::new(params, ""));
        assert!(!response.is_ok());
        assert!(response.outcome.reason.contains("invalid credentials"));
        assert!(response.session_id.is_empty());
    }

    #[test]
    fn login_runs_its_query() {
        let (handler, provider) = create_handler();
        provider.with_rows("FROM prefs", single_column("theme", &["dark"]));
        let params = RequestParams::new(Command::Login)
            .with("user", "ann")
            .with("pwd", "pw");
        let body = Request::query(QueryPayload::Text("SELECT theme FROM prefs".into()));
        let response = handler.handle(&IncomingRequest::new(params, body.encode()));
        match response.payload {
            ResponsePayload::Rows(set) => assert_eq!(set.value(0, "theme"), Some("dark")),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn commands_need_a_session() {
        let (handler, _) = create_handler();
        let body = Request::statements(vec![PostStatement::sql("DELETE FROM t")]);
        let response = post(&handler, Command::Trans, "bogus", &body);
        assert!(!response.is_ok());
        assert_eq!(response.outcome.reason, "SESSION_EXP");
        assert_eq!(response.outcome.code, None);
    }

    #[test]
    fn unknown_command() {
        let (handler, _) = create_handler();
        let id = login(&handler);
        let response = post(&handler, Command::parse("fly"), &id, &Request::default());
        assert_eq!(response.outcome.reason, "unrecognized command: fly");
    }

    #[test]
    fn transaction_returns_gen_ids() {
        let (handler, provider) = create_handler();
        let id = login(&handler);
        let body = Request::statements(vec![
            PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("ID"),
            PostStatement::sql("INSERT INTO t2(tid) VALUES('<GenID1>')"),
        ]);
        let response = post(&handler, Command::Trans, &id, &body);
        assert!(response.is_ok());
        assert_eq!(response.payload, ResponsePayload::GenIds(vec!["7".into()]));
        assert_eq!(response.session_id, id);
        assert_eq!(provider.executed()[1], "INSERT INTO t2(tid) VALUES(7)");
    }

    #[test]
    fn database_errors_keep_text_and_code() {
        let (handler, provider) = create_handler();
        provider.fail_on("dup", DbError::new("UNIQUE constraint failed: t.name", 2067));
        let id = login(&handler);
        let body = Request::statements(vec![PostStatement::sql("INSERT INTO t VALUES('dup')")]);
        let response = post(&handler, Command::Exec, &id, &body);
        assert_eq!(response.outcome.reason, "UNIQUE constraint failed: t.name");
        assert_eq!(response.outcome.code, Some(2067));
        assert_eq!(response.payload, ResponsePayload::None);
    }

    #[test]
    fn malformed_body_is_a_failure_response() {
        let (handler, _) = create_handler();
        let id = login(&handler);
        let response = handler.handle(
            &IncomingRequest::new(RequestParams::new(Command::Trans), "<JotyReq><Stmnts>")
                .with_session(id.clone()),
        );
        assert!(!response.is_ok());
        assert_eq!(response.session_id, id);
    }

    #[test]
    fn report_without_engine() {
        let (handler, _) = create_handler();
        let id = login(&handler);
        let body = Request::report(vec![Item::long("year", 2024)]);
        let response = handler.handle(
            &IncomingRequest::new(
                RequestParams::new(Command::Report).with("name", "sales"),
                body.encode(),
            )
            .with_session(id),
        );
        assert_eq!(response.outcome.reason, "NO_BIRT");
    }

    #[test]
    fn report_with_engine() {
        let provider = MemoryProvider::new();
        let engine = |name: &str,
                      params: &ParamContext,
                      _conn: &mut dyn Connection|
         -> Result<Vec<u8>, String> {
            Ok(format!("{name} {}", params.get("year")).into_bytes())
        };
        let context = HandlerContext::new(
            ServerConfig::default().with_require_session(false),
            Arc::new(Accessor::builder().build().unwrap()),
            Arc::new(provider),
        )
        .with_report_engine(Arc::new(engine));
        let handler = RequestHandler::new(Arc::new(context));
        let body = Request::report(vec![Item::long("year", 2024)]);
        let response = handler.handle(&IncomingRequest::new(
            RequestParams::new(Command::Report).with("name", "sales"),
            body.encode(),
        ));
        assert_eq!(
            response.payload,
            ResponsePayload::Report(b"sales 2024".to_vec())
        );
    }

    #[test]
    fn end_closes_the_session() {
        let (handler, provider) = create_handler();
        let id = login(&handler);
        let response = handler.handle(
            &IncomingRequest::new(RequestParams::new(Command::End), "").with_session(id.clone()),
        );
        assert!(response.is_ok());
        assert!(response.session_id.is_empty());
        assert!(handler.context.sessions.is_empty());
        assert!(!provider.events().contains(&MemoryEvent::Acquire));

        let again = post(&handler, Command::Query, &id, &Request::default());
        assert_eq!(again.outcome.reason, "SESSION_EXP");
    }

    #[test]
    fn idle_session_expires() {
        let clock = Arc::new(ManualClock::new());
        let context = HandlerContext::new(
            ServerConfig::default().with_session_timeout(Duration::from_secs(60)),
            Arc::new(Accessor::builder().build().unwrap()),
            Arc::new(MemoryProvider::new()),
        )
        .with_authenticator(Arc::new(StaticAuthenticator::new().with_user("ann", "pw")))
        .with_clock(clock.clone());
        let handler = RequestHandler::new(Arc::new(context));
        let id = login(&handler);

        clock.advance(Duration::from_secs(61));
        let body = Request::query(QueryPayload::Text("SELECT 1".into()));
        let response = post(&handler, Command::Query, &id, &body);
        assert_eq!(response.outcome.reason, "SESSION_EXP");
    }

    #[test]
    fn session_is_checked_before_the_body() {
        let (handler, _) = create_handler();
        for body in ["<JotyReq/>", "<JotyReq><Stmnts>", "not xml"] {
            let response = handler.handle(&IncomingRequest::new(
                RequestParams::new(Command::Trans),
                body,
            ));
            assert_eq!(response.outcome.reason, "SESSION_EXP", "body {body:?}");
        }
    }

    #[test]
    fn keyed_sessions_are_held_to_the_catalog() {
        let (handler, provider) = create_shared_handler();
        provider.with_rows("FROM t", single_column("name", &["x"]));
        let ann = login_as(&handler, "ann");

        let query = Request::query(QueryPayload::Text("SELECT name FROM t".into()));
        let response = post(&handler, Command::Query, &ann, &query);
        assert!(!response.is_ok());
        assert!(response.outcome.reason.starts_with("unresolved statement"));

        let literal = Request::statements(vec![PostStatement::sql("DELETE FROM t")]);
        let response = post(&handler, Command::Exec, &ann, &literal);
        assert!(!response.is_ok());
        assert!(provider.executed().is_empty());

        let catalog = Request::statements(vec![PostStatement::sql("purge")]);
        assert!(post(&handler, Command::Exec, &ann, &catalog).is_ok());
        assert_eq!(provider.executed(), vec!["DELETE FROM t WHERE tenant = 'a'".to_string()]);
    }

    #[test]
    fn unkeyed_sessions_keep_literal_sql() {
        let (handler, provider) = create_shared_handler();
        provider.with_rows("FROM t", single_column("name", &["x"]));
        let ops = login_as(&handler, "ops");

        let query = Request::query(QueryPayload::Text("SELECT name FROM t".into()));
        assert!(post(&handler, Command::Query, &ops, &query).is_ok());

        let literal = Request::statements(vec![PostStatement::sql("DELETE FROM t")]);
        assert!(post(&handler, Command::Exec, &ops, &literal).is_ok());
        assert!(provider.executed().contains(&"DELETE FROM t".to_string()));
    }
}
