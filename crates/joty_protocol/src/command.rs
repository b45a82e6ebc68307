//! Commands and the request query string.

use std::fmt;

/// Query-string key carrying the command.
pub const COMMAND_PARAM: &str = "command";

/// Path parameter carrying the session id when cookies are off.
pub const SESSION_PATH_PARAM: &str = ";jsessionid=";

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// A protocol command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Authenticate and open a session.
    Login,
    /// Run a query and return rows.
    Query,
    /// Render a report.
    Report,
    /// Run a batch inside one database transaction.
    Trans,
    /// Run a batch in autocommit mode.
    Exec,
    /// Close the session.
    End,
    /// Anything else; rejected by the server.
    Other(String),
}

impl Command {
    /// Parses a command word (case-insensitive).
    pub fn parse(word: &str) -> Self {
        match word.trim().to_ascii_lowercase().as_str() {
            "login" => Command::Login,
            "query" => Command::Query,
            "report" => Command::Report,
            "trans" => Command::Trans,
            "exec" => Command::Exec,
            "end" => Command::End,
            _ => Command::Other(word.to_string()),
        }
    }

    /// Returns the wire word.
    pub fn as_str(&self) -> &str {
        match self {
            Command::Login => "login",
            Command::Query => "query",
            Command::Report => "report",
            Command::Trans => "trans",
            Command::Exec => "exec",
            Command::End => "end",
            Command::Other(word) => word,
        }
    }

    /// Whether the request carries an XML body (sent as POST).
    pub fn has_body(&self) -> bool {
        !matches!(self, Command::End)
    }

    /// Whether the body is a statement list.
    pub fn is_batch(&self) -> bool {
        matches!(self, Command::Trans | Command::Exec)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The query string of a request: the command plus extra parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    /// Command.
    pub command: Command,
    /// Extra parameters in insertion order.
    pub extra: Vec<(String, String)>,
}

impl RequestParams {
    /// Creates parameters for a command.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            extra: Vec::new(),
        }
    }

    /// Adds an extra parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Returns an extra parameter by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Renders `command=...&k=v...`, percent-encoded.
    pub fn to_query_string(&self) -> String {
        let mut out = format!("{COMMAND_PARAM}={}", urlencoding::encode(self.command.as_str()));
        for (name, value) in &self.extra {
            out.push('&');
            out.push_str(&urlencoding::encode(name));
            out.push('=');
            out.push_str(&urlencoding::encode(value));
        }
        out
    }

    /// Parses a query string. A missing command parses as `Other("")`.
    pub fn parse(query: &str) -> Self {
        let mut command = Command::Other(String::new());
        let mut extra = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode_component(name);
            let value = decode_component(value);
            if name == COMMAND_PARAM {
                command = Command::parse(&value);
            } else {
                extra.push((name, value));
            }
        }
        Self { command, extra }
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Appends `;jsessionid=<id>` to a URL path.
pub fn with_session_path(url: &str, session_id: &str) -> String {
    format!("{url}{SESSION_PATH_PARAM}{session_id}")
}

/// Splits a path into the bare path and an embedded session id.
pub fn split_session_path(path: &str) -> (&str, Option<&str>) {
    match path.find(SESSION_PATH_PARAM) {
        Some(pos) => {
            let id = &path[pos + SESSION_PATH_PARAM.len()..];
            let id = id.split(['/', '?']).next().unwrap_or(id);
            (&path[..pos], (!id.is_empty()).then_some(id))
        }
        None => (path, None),
    }
}
