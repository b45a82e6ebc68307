//! Request and response documents.
//!
//! ```text
//! <JotyReq>                       <JotyResp>
//!   <Stmnts>|<QueryStmnt>|...       <Result><Value/><Reason/><Code/></Result>
//!   <Binary>...</Binary>*           [<GenIDs>|<Structure><Data>|<Report>]
//! </JotyReq>                        <S_ID/>
//!                                 </JotyResp>
//! ```

use crate::binary::{decode_binary, encode_binary};
use crate::command::Command;
use crate::error::{ProtocolError, ProtocolResult};
use crate::item::Item;
use crate::result_set::ResultSet;
use crate::statement::PostStatement;
use joty_xml::{from_xml, to_xml, Element};

/// Root of a request document.
pub const REQUEST_ROOT: &str = "JotyReq";

/// Root of a response document.
pub const RESPONSE_ROOT: &str = "JotyResp";

/// The query carried by a login or query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPayload {
    /// SQL text or a statement name.
    Text(String),
    /// A full statement descriptor, for composed queries.
    Definition(PostStatement),
}

/// Command-specific request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Ordered statements of a `trans` or `exec` batch.
    Statements(Vec<PostStatement>),
    /// A query, plus the names of small-blob columns to return inline.
    Query {
        /// The query, if any.
        query: Option<QueryPayload>,
        /// Small-blob column names.
        small_blobs: Vec<String>,
    },
    /// Report parameters.
    Report(Vec<Item>),
}

/// A decoded request body with its binary attachments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// Body.
    pub body: RequestBody,
    /// Binary payloads, in document order.
    pub binaries: Vec<Vec<u8>>,
}

impl Request {
    /// Creates a batch request.
    pub fn statements(statements: Vec<PostStatement>) -> Self {
        Self {
            body: RequestBody::Statements(statements),
            binaries: Vec::new(),
        }
    }

    /// Creates a query request.
    pub fn query(query: QueryPayload) -> Self {
        Self {
            body: RequestBody::Query {
                query: Some(query),
                small_blobs: Vec::new(),
            },
            binaries: Vec::new(),
        }
    }

    /// Creates a report request.
    pub fn report(params: Vec<Item>) -> Self {
        Self {
            body: RequestBody::Report(params),
            binaries: Vec::new(),
        }
    }

    /// Attaches a binary payload.
    pub fn with_binary(mut self, bytes: Vec<u8>) -> Self {
        self.binaries.push(bytes);
        self
    }

    /// Builds the `<JotyReq>` element.
    pub fn to_element(&self) -> Element {
        let mut root = Element::new(REQUEST_ROOT);
        match &self.body {
            RequestBody::Empty => {}
            RequestBody::Statements(statements) => {
                let mut list = Element::new("Stmnts");
                for stmt in statements {
                    list.push(stmt.to_element());
                }
                root.push(list);
            }
            RequestBody::Query { query, small_blobs } => {
                match query {
                    Some(QueryPayload::Text(sql)) => {
                        root.push(Element::leaf("QueryStmnt", sql.clone()));
                    }
                    Some(QueryPayload::Definition(stmt)) => {
                        root.push(stmt.to_element_named("QueryDef"));
                    }
                    None => {}
                }
                if !small_blobs.is_empty() {
                    let mut blobs = Element::new("SmallBlobs");
                    for field in small_blobs {
                        blobs.push(Element::leaf("Field", field.clone()));
                    }
                    root.push(blobs);
                }
            }
            RequestBody::Report(params) => {
                let mut list = Element::new("ReportParms");
                for item in params {
                    list.push(item.to_element());
                }
                root.push(list);
            }
        }
        for bytes in &self.binaries {
            root.push(Element::leaf("Binary", encode_binary(bytes)));
        }
        root
    }

    /// Serializes the request document.
    pub fn encode(&self) -> String {
        to_xml(&self.to_element())
    }

    /// Parses a request body. The command decides the expected shape;
    /// a blank body decodes as [`RequestBody::Empty`].
    pub fn decode(command: &Command, text: &str) -> ProtocolResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let root = from_xml(text)?;
        if root.name != REQUEST_ROOT {
            return Err(ProtocolError::InvalidRoot {
                expected: REQUEST_ROOT,
                found: root.name,
            });
        }
        let binaries = root
            .children_named("Binary")
            .map(|el| decode_binary(el.text()))
            .collect::<ProtocolResult<Vec<_>>>()?;

        let body = match command {
            Command::Trans | Command::Exec => {
                let list = root
                    .child("Stmnts")
                    .ok_or_else(|| ProtocolError::missing(REQUEST_ROOT, "Stmnts"))?;
                let statements = list
                    .children
                    .iter()
                    .map(|el| {
                        if el.name == "Stmnt" {
                            PostStatement::from_element(el)
                        } else {
                            Err(ProtocolError::UnexpectedNode {
                                expected: "Stmnt".into(),
                                found: el.name.clone(),
                            })
                        }
                    })
                    .collect::<ProtocolResult<Vec<_>>>()?;
                RequestBody::Statements(statements)
            }
            Command::Report => {
                let params = match root.child("ReportParms") {
                    Some(list) => list
                        .children_named("Item")
                        .map(Item::from_element)
                        .collect::<ProtocolResult<Vec<_>>>()?,
                    None => Vec::new(),
                };
                RequestBody::Report(params)
            }
            _ => {
                let query = if let Some(text) = root.child_text("QueryStmnt") {
                    Some(QueryPayload::Text(text.to_string()))
                } else if let Some(def) = root.child("QueryDef") {
                    Some(QueryPayload::Definition(PostStatement::from_element(def)?))
                } else {
                    None
                };
                let small_blobs: Vec<String> = root
                    .child("SmallBlobs")
                    .map(|el| {
                        el.children_named("Field")
                            .map(|f| f.text.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                if query.is_none() && small_blobs.is_empty() {
                    RequestBody::Empty
                } else {
                    RequestBody::Query { query, small_blobs }
                }
            }
        };
        Ok(Self { body, binaries })
    }
}

/// The `<Result>` block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// `Ok` on the wire when true.
    pub ok: bool,
    /// Failure text, verbatim from the server.
    pub reason: String,
    /// Database error code, when one exists.
    pub code: Option<i64>,
}

/// Command-specific response payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponsePayload {
    /// Nothing beyond the outcome.
    #[default]
    None,
    /// Values generated or returned by a batch, in order.
    GenIds(Vec<String>),
    /// Query rows.
    Rows(ResultSet),
    /// Rendered report.
    Report(Vec<u8>),
}

/// A response document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// Outcome.
    pub outcome: Outcome,
    /// Payload, present only on success.
    pub payload: ResponsePayload,
    /// Session id.
    pub session_id: String,
}

impl Response {
    /// A successful response.
    pub fn ok(payload: ResponsePayload) -> Self {
        Self {
            outcome: Outcome {
                ok: true,
                reason: String::new(),
                code: None,
            },
            payload,
            session_id: String::new(),
        }
    }

    /// A failed response.
    pub fn failure(reason: impl Into<String>, code: Option<i64>) -> Self {
        Self {
            outcome: Outcome {
                ok: false,
                reason: reason.into(),
                code,
            },
            payload: ResponsePayload::None,
            session_id: String::new(),
        }
    }

    /// Sets the session id.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Whether the outcome is `Ok`.
    pub fn is_ok(&self) -> bool {
        self.outcome.ok
    }

    /// Builds the `<JotyResp>` element.
    pub fn to_element(&self) -> Element {
        let code = self.outcome.code.map(|c| c.to_string()).unwrap_or_default();
        let mut root = Element::new(RESPONSE_ROOT).with_child(
            Element::new("Result")
                .with_child(Element::leaf(
                    "Value",
                    if self.outcome.ok { "Ok" } else { "Nok" },
                ))
                .with_child(Element::leaf("Reason", self.outcome.reason.clone()))
                .with_child(Element::leaf("Code", code)),
        );
        if self.outcome.ok {
            match &self.payload {
                ResponsePayload::None => {}
                ResponsePayload::GenIds(ids) => {
                    let mut list = Element::new("GenIDs");
                    for id in ids {
                        list.push(Element::leaf("GenID", id.clone()));
                    }
                    root.push(list);
                }
                ResponsePayload::Rows(set) => {
                    let (structure, data) = set.to_elements();
                    root.push(structure);
                    root.push(data);
                }
                ResponsePayload::Report(bytes) => {
                    root.push(Element::leaf("Report", encode_binary(bytes)));
                }
            }
        }
        root.push(Element::leaf("S_ID", self.session_id.clone()));
        root
    }

    /// Serializes the response document.
    pub fn encode(&self) -> String {
        to_xml(&self.to_element())
    }

    /// Parses a response document.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let root = from_xml(text)?;
        if root.name != RESPONSE_ROOT {
            return Err(ProtocolError::InvalidRoot {
                expected: RESPONSE_ROOT,
                found: root.name,
            });
        }
        let result = root
            .child("Result")
            .ok_or_else(|| ProtocolError::missing(RESPONSE_ROOT, "Result"))?;
        let value = result
            .child_text("Value")
            .ok_or_else(|| ProtocolError::missing("Result", "Value"))?;
        let code_text = result.child_text("Code").unwrap_or("").trim();
        let code = if code_text.is_empty() {
            None
        } else {
            Some(
                code_text
                    .parse::<i64>()
                    .map_err(|_| ProtocolError::invalid_field("Code", code_text))?,
            )
        };
        let outcome = Outcome {
            ok: value.trim().eq_ignore_ascii_case("ok"),
            reason: result.child_text("Reason").unwrap_or("").to_string(),
            code,
        };

        let payload = if let Some(list) = root.child("GenIDs") {
            ResponsePayload::GenIds(
                list.children_named("GenID")
                    .map(|el| el.text.clone())
                    .collect(),
            )
        } else if let Some(structure) = root.child("Structure") {
            let empty = Element::new("Data");
            let data = root.child("Data").unwrap_or(&empty);
            ResponsePayload::Rows(ResultSet::from_elements(structure, data)?)
        } else if let Some(report) = root.child("Report") {
            ResponsePayload::Report(decode_binary(report.text())?)
        } else {
            ResponsePayload::None
        };

        Ok(Self {
            outcome,
            payload,
            session_id: root.child_text("S_ID").unwrap_or("").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;
    use crate::result_set::FieldDesc;
    use crate::statement::RollbackTag;

    #[test]
    fn batch_request_roundtrip() {
        let mut first = PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("ID");
        first.add_item("name", "a", ItemType::Text);
        let second = PostStatement::sql("INSERT INTO t2(tid) VALUES('<GenID1>')")
            .with_rollback(RollbackTag::Forward(1));
        let request = Request::statements(vec![first, second]).with_binary(vec![0, 255, 10]);
        let decoded = Request::decode(&Command::Trans, &request.encode()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn query_text_request() {
        let request = Request::query(QueryPayload::Text("select * from t".into()));
        let text = request.encode();
        assert!(text.contains("<QueryStmnt>select * from t</QueryStmnt>"));
        assert_eq!(Request::decode(&Command::Query, &text).unwrap(), request);
    }

    #[test]
    fn query_definition_and_small_blobs() {
        let def = PostStatement::new()
            .with_coordinates("Orders", 0, "")
            .with_paging("status='open'", "", 2);
        let request = Request {
            body: RequestBody::Query {
                query: Some(QueryPayload::Definition(def)),
                small_blobs: vec!["thumb".into()],
            },
            binaries: Vec::new(),
        };
        let text = request.encode();
        assert!(text.contains("<QueryDef>"));
        assert_eq!(Request::decode(&Command::Login, &text).unwrap(), request);
    }

    #[test]
    fn report_request() {
        let request = Request::report(vec![Item::long("year", 2024)]);
        assert_eq!(
            Request::decode(&Command::Report, &request.encode()).unwrap(),
            request
        );
    }

    #[test]
    fn blank_body_is_empty() {
        assert_eq!(
            Request::decode(&Command::End, "").unwrap(),
            Request::default()
        );
    }

    #[test]
    fn batch_without_statements_is_rejected() {
        let text = Request::query(QueryPayload::Text("x".into())).encode();
        assert!(matches!(
            Request::decode(&Command::Exec, &text),
            Err(ProtocolError::MissingNode { .. })
        ));
    }

    #[test]
    fn wrong_root_is_rejected() {
        assert!(matches!(
            Request::decode(&Command::Query, "<Other/>"),
            Err(ProtocolError::InvalidRoot { .. })
        ));
    }

    #[test]
    fn gen_ids_response() {
        let response = Response::ok(ResponsePayload::GenIds(vec!["7".into(), "8".into()]))
            .with_session("s1");
        let text = response.encode();
        assert!(text.contains("<GenIDs><GenID>7</GenID><GenID>8</GenID></GenIDs>"));
        assert!(text.ends_with("<S_ID>s1</S_ID></JotyResp>"));
        assert_eq!(Response::decode(&text).unwrap(), response);
    }

    #[test]
    fn rows_response() {
        let mut set = ResultSet::new(vec![FieldDesc::new("ID", 10, 0)]);
        set.push_record(vec![Some("1".into())]);
        let response = Response::ok(ResponsePayload::Rows(set)).with_session("s");
        assert_eq!(Response::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn report_response() {
        let response = Response::ok(ResponsePayload::Report(b"%PDF-1.4\x00\xff".to_vec()));
        assert_eq!(Response::decode(&response.encode()).unwrap(), response);
    }

    #[test]
    fn failure_carries_reason_and_code() {
        let response = Response::failure("UNIQUE constraint failed: t.name", Some(2067));
        let decoded = Response::decode(&response.encode()).unwrap();
        assert!(!decoded.is_ok());
        assert_eq!(decoded.outcome.code, Some(2067));
        assert_eq!(decoded.outcome.reason, "UNIQUE constraint failed: t.name");
    }

    #[test]
    fn failure_never_carries_payload() {
        let mut response = Response::failure("boom", None);
        response.payload = ResponsePayload::GenIds(vec!["1".into()]);
        assert!(!response.encode().contains("GenIDs"));
    }

    #[test]
    fn value_is_case_insensitive() {
        let text = "<JotyResp><Result><Value>OK</Value><Reason/><Code/></Result><S_ID/></JotyResp>";
        let decoded = Response::decode(text).unwrap();
        assert!(decoded.is_ok());
        assert_eq!(decoded.outcome.code, None);
    }
}
