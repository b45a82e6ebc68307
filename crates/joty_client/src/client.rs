//! The client protocol engine.
//!
//! # Invariants
//!
//! - One request is outstanding at a time; every operation takes `&mut self`.
//! - While a transaction is being built, statements accumulate locally and
//!   nothing is sent until [`WebClient::end_transaction`].
//! - The first statement of a batch carries every context parameter; later
//!   statements carry only parameters set since the previous one.
//! - Method calls carry only their own arguments and never take context
//!   parameters, so they do not count as the first statement either.
//! - A successful batch replaces the returned values wholesale.

use crate::check::{classify, ExceptionCheck, PatternExceptionCheck};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::HttpClient;
use joty_protocol::{
    gen_token, with_session_path, Command, ErrorReason, Item, ParamContext, PostStatement,
    QueryPayload, Request, RequestBody, RequestParams, Response, ResponsePayload, ResultSet,
};
use tracing::{debug, info, warn};

/// Observer of session changes.
pub trait SessionListener: Send + Sync {
    /// Called when the server assigns a new session id (empty when closed).
    fn session_changed(&self, session_id: &str);

    /// Called when the server reports the session as expired.
    fn session_expired(&self) {}
}

/// Client side of the protocol.
///
/// # Example
///
/// ```
/// use joty_client::{ClientConfig, MockHttpClient, WebClient};
/// use joty_protocol::{PostStatement, Response, ResponsePayload};
///
/// let http = MockHttpClient::new();
/// http.push_response(&Response::ok(ResponsePayload::GenIds(vec!["7".into()])).with_session("S1"));
///
/// let mut client = WebClient::new(ClientConfig::default(), http);
/// client.begin_transaction();
/// client.add_statement(PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("id")).unwrap();
/// let token = client.gen_token(0).unwrap();
/// client.add_statement(PostStatement::sql(format!("INSERT INTO t2(tid) VALUES({token})"))).unwrap();
/// client.end_transaction().unwrap();
///
/// assert_eq!(client.returned_values(), ["7"]);
/// assert_eq!(client.session_id(), "S1");
/// ```
pub struct WebClient<C: HttpClient> {
    config: ClientConfig,
    http: C,
    check: Box<dyn ExceptionCheck>,
    listener: Option<Box<dyn SessionListener>>,
    session_id: String,
    params: ParamContext,
    batch: Vec<PostStatement>,
    building: bool,
    expected_returns: usize,
    binaries: Vec<Vec<u8>>,
    extra: Vec<(String, String)>,
    returned: Vec<String>,
    last_batch: Vec<PostStatement>,
}

impl<C: HttpClient> WebClient<C> {
    /// Creates a client. Failures are classified with
    /// [`PatternExceptionCheck::sqlite`] until another check is set.
    pub fn new(config: ClientConfig, http: C) -> Self {
        Self {
            config,
            http,
            check: Box::new(PatternExceptionCheck::sqlite()),
            listener: None,
            session_id: String::new(),
            params: ParamContext::new(),
            batch: Vec::new(),
            building: false,
            expected_returns: 0,
            binaries: Vec::new(),
            extra: Vec::new(),
            returned: Vec::new(),
            last_batch: Vec::new(),
        }
    }

    /// Sets the DBMS exception check.
    pub fn with_exception_check(mut self, check: impl ExceptionCheck + 'static) -> Self {
        self.check = Box::new(check);
        self
    }

    /// Sets the session listener.
    pub fn with_session_listener(mut self, listener: impl SessionListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn http(&self) -> &C {
        &self.http
    }

    /// Current session id (empty before login).
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Replaces the session id, e.g. to resume a session.
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = session_id.into();
    }

    /// The parameter context sent with statements.
    pub fn params(&self) -> &ParamContext {
        &self.params
    }

    /// Mutable access to the parameter context.
    pub fn params_mut(&mut self) -> &mut ParamContext {
        &mut self.params
    }

    /// Values returned by the last successful batch: generated ids and
    /// method outputs, in execution order.
    pub fn returned_values(&self) -> &[String] {
        &self.returned
    }

    /// Statements of the last successful batch, with method out-values filled.
    pub fn last_batch(&self) -> &[PostStatement] {
        &self.last_batch
    }

    /// Whether a transaction is being built.
    pub fn is_building_transaction(&self) -> bool {
        self.building
    }

    /// Number of statements waiting to be sent.
    pub fn pending_statements(&self) -> usize {
        self.batch.len()
    }

    /// Adds a query-string parameter to the next request.
    pub fn set_request_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.extra.push((name.into(), value.into()));
    }

    /// Attaches a binary payload to the next request.
    pub fn add_binary(&mut self, bytes: Vec<u8>) {
        self.binaries.push(bytes);
    }

    /// Starts building a transaction.
    pub fn begin_transaction(&mut self) {
        self.clear_terms();
        self.batch.clear();
        self.expected_returns = 0;
        self.building = true;
    }

    /// Drops the transaction being built without sending it.
    pub fn abort_transaction(&mut self) {
        if self.building {
            debug!(dropped = self.batch.len(), "transaction aborted");
        }
        self.building = false;
        self.batch.clear();
        self.expected_returns = 0;
        self.clear_terms();
    }

    /// Adds a statement.
    ///
    /// Inside a transaction the statement joins the pending batch. Outside
    /// one it is sent at once with the `exec` command.
    pub fn add_statement(&mut self, statement: PostStatement) -> ClientResult<()> {
        if self.building {
            self.stage(statement);
            return Ok(());
        }
        self.batch.clear();
        self.expected_returns = 0;
        self.stage(statement);
        self.send_batch(Command::Exec)
    }

    /// Sends the pending transaction as one `trans` request.
    pub fn end_transaction(&mut self) -> ClientResult<()> {
        if !self.building {
            warn!("end_transaction without begin_transaction");
            return Err(ClientError::Usage("no transaction is being built".into()));
        }
        self.building = false;
        if self.batch.is_empty() {
            self.clear_terms();
            return Ok(());
        }
        self.send_batch(Command::Trans)
    }

    /// Renders the `'<GenIDn>'` token for an id generated earlier in the
    /// pending batch. Index 0 refers to the latest one.
    pub fn gen_token(&self, index: usize) -> ClientResult<String> {
        if index > 0 {
            return Ok(gen_token(index));
        }
        if self.expected_returns == 0 {
            warn!("gen_token(0) before any generated id");
            return Err(ClientError::Usage(
                "no generated id has been allocated yet".into(),
            ));
        }
        Ok(gen_token(self.expected_returns))
    }

    /// Authenticates and opens a session, optionally running a query.
    pub fn login(
        &mut self,
        user: &str,
        password: &str,
        query: Option<QueryPayload>,
    ) -> ClientResult<Option<ResultSet>> {
        self.set_request_param("user", user);
        self.set_request_param("pwd", password);
        let request = match query {
            Some(query) => Request::query(query),
            None => Request::default(),
        };
        match self.send(Command::Login, Some(request))? {
            ResponsePayload::Rows(rows) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    /// Runs a query.
    pub fn query(&mut self, query: QueryPayload) -> ClientResult<ResultSet> {
        self.query_with_blobs(query, &[])
    }

    /// Runs a query, returning the named BLOB columns inline.
    pub fn query_with_blobs(
        &mut self,
        query: QueryPayload,
        small_blobs: &[&str],
    ) -> ClientResult<ResultSet> {
        let query = match query {
            QueryPayload::Definition(mut def) => {
                self.attach_params(&mut def, false);
                QueryPayload::Definition(def)
            }
            text => text,
        };
        let request = Request {
            body: RequestBody::Query {
                query: Some(query),
                small_blobs: small_blobs.iter().map(|s| s.to_string()).collect(),
            },
            binaries: Vec::new(),
        };
        match self.send(Command::Query, Some(request))? {
            ResponsePayload::Rows(rows) => Ok(rows),
            _ => Ok(ResultSet::default()),
        }
    }

    /// Renders a named report.
    pub fn report(&mut self, name: &str, params: Vec<Item>) -> ClientResult<Vec<u8>> {
        self.set_request_param("name", name);
        match self.send(Command::Report, Some(Request::report(params)))? {
            ResponsePayload::Report(bytes) => Ok(bytes),
            _ => Ok(Vec::new()),
        }
    }

    /// Closes the session.
    pub fn end_session(&mut self) -> ClientResult<()> {
        self.send(Command::End, None)?;
        Ok(())
    }

    fn clear_terms(&mut self) {
        self.extra.clear();
        self.binaries.clear();
    }

    fn attach_params(&mut self, statement: &mut PostStatement, dirty_only: bool) {
        for item in self.params.to_items(dirty_only) {
            let carried = statement
                .items
                .iter()
                .any(|own| own.name.eq_ignore_ascii_case(&item.name));
            if !carried {
                statement.items.push(item);
            }
        }
        self.params.set_dirty(false);
    }

    fn stage(&mut self, mut statement: PostStatement) {
        if !statement.is_method_call() {
            let first = self.batch.iter().all(PostStatement::is_method_call);
            self.attach_params(&mut statement, !first);
        }
        if !statement.auto_id_field.is_empty() {
            self.expected_returns += 1;
        }
        if let Some(out) = statement.out_params {
            self.expected_returns += out.produced();
        }
        self.batch.push(statement);
    }

    fn send_batch(&mut self, command: Command) -> ClientResult<()> {
        let statements = std::mem::take(&mut self.batch);
        self.expected_returns = 0;
        let mut request = Request::statements(statements.clone());
        request.binaries = std::mem::take(&mut self.binaries);
        if let ResponsePayload::GenIds(ids) = self.send(command, Some(request))? {
            self.returned = ids;
        }
        self.last_batch = statements;
        for statement in &mut self.last_batch {
            fill_out_values(statement, &self.returned);
        }
        Ok(())
    }

    fn url(&self, params: &RequestParams) -> String {
        let base = if !self.config.use_cookies && !self.session_id.is_empty() {
            with_session_path(&self.config.server_url, &self.session_id)
        } else {
            self.config.server_url.clone()
        };
        format!("{base}?{}", params.to_query_string())
    }

    fn send(&mut self, command: Command, request: Option<Request>) -> ClientResult<ResponsePayload> {
        let mut params = RequestParams::new(command.clone());
        for (name, value) in self.extra.drain(..) {
            params = params.with(name, value);
        }
        let url = self.url(&params);
        let mut request = request.unwrap_or_default();
        request.binaries.append(&mut self.binaries);

        let statements = match &request.body {
            RequestBody::Statements(list) => list.len(),
            _ => 0,
        };
        debug!(%command, statements, "sending request");
        let text = if command.has_body() {
            self.http.post(&url, request.encode())?
        } else {
            self.http.get(&url)?
        };
        let response = Response::decode(&text)?;
        self.handle_response(response)
    }

    fn handle_response(&mut self, response: Response) -> ClientResult<ResponsePayload> {
        if response.is_ok() {
            self.update_session(response.session_id);
            return Ok(response.payload);
        }

        let message = response.outcome.reason;
        let code = response.outcome.code;
        let reason = classify(&message, code, self.check.as_ref());
        if reason == ErrorReason::SessionExpired {
            warn!("session expired");
            if let Some(listener) = &self.listener {
                listener.session_expired();
            }
        } else {
            self.update_session(response.session_id);
        }
        debug!(%reason, ?code, "request failed");
        Err(ClientError::Rejected {
            reason,
            message,
            code,
        })
    }

    fn update_session(&mut self, session_id: String) {
        if session_id == self.session_id {
            return;
        }
        info!(session = %session_id, "session changed");
        if let Some(listener) = &self.listener {
            listener.session_changed(&session_id);
        }
        self.session_id = session_id;
    }
}

fn fill_out_values(statement: &mut PostStatement, returned: &[String]) {
    let Some(first) = statement.out_params.and_then(|o| o.first_pos) else {
        return;
    };
    let start = (first as usize).saturating_sub(1);
    for (slot, value) in statement
        .out_values
        .iter_mut()
        .zip(returned.iter().skip(start))
    {
        slot.clone_from(value);
    }
}
