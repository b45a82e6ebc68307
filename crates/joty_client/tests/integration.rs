//! Client engine against an in-process server backed by SQLite.

use joty_client::{ClientConfig, ClientError, LoopbackClient, LoopbackServer, WebClient};
use joty_protocol::{
    decode_binary, ErrorReason, Item, ItemType, OutParams, PostStatement, QueryPayload,
};
use joty_resolver::CatalogSpec;
use joty_server::{
    HandlerContext, JotyServer, MethodOutput, MethodRegistry, MethodSpec, ServerConfig,
    SqliteProvider, StaticAuthenticator,
};
use std::sync::Arc;
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE t (ID INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
    CREATE TABLE t2 (tid INTEGER NOT NULL);
    CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
    CREATE TABLE photos (id INTEGER PRIMARY KEY, photo BLOB);
";

const CATALOG: &str = r#"{
    "statements": [
        { "name": "accountByName",
          "sql": "SELECT id FROM accounts WHERE name = '%1$s'",
          "params": [ { "position": 1, "context": "name" } ] }
    ]
}"#;

/// Adapter from the server's text entry point to the loopback seam.
struct Local(Arc<JotyServer>);

impl LoopbackServer for Local {
    fn handle_text(&self, query: &str, session_id: Option<&str>, body: &str) -> String {
        self.0.handle_text(query, session_id, body)
    }
}

struct Fixture {
    _dir: TempDir,
    server: Arc<JotyServer>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let provider = SqliteProvider::open(dir.path().join("joty.db")).unwrap();
    provider.init_schema(SCHEMA).unwrap();
    let accessor = CatalogSpec::from_json(CATALOG).unwrap().build().unwrap();
    let methods = MethodRegistry::new()
        .with(
            "double",
            MethodSpec::new(vec![ItemType::Long], |call| {
                let n = call.long(0).ok_or("n must be a long")?;
                Ok(MethodOutput::returning((n * 2).to_string()))
            })
            .returning(),
        )
        .unwrap();
    let context = HandlerContext::new(
        ServerConfig::default(),
        Arc::new(accessor),
        Arc::new(provider),
    )
    .with_methods(Arc::new(methods))
    .with_authenticator(Arc::new(StaticAuthenticator::new().with_user("ann", "pw")));
    Fixture {
        _dir: dir,
        server: Arc::new(JotyServer::new(context)),
    }
}

impl Fixture {
    fn client(&self, use_cookies: bool) -> WebClient<LoopbackClient<Local>> {
        WebClient::new(
            ClientConfig::new("http://localhost/joty").with_cookies(use_cookies),
            LoopbackClient::new(Local(Arc::clone(&self.server))),
        )
    }

    fn logged_in(&self, use_cookies: bool) -> WebClient<LoopbackClient<Local>> {
        let mut client = self.client(use_cookies);
        client.login("ann", "pw", None).unwrap();
        assert!(!client.session_id().is_empty());
        client
    }
}

#[test]
fn transaction_with_generated_id_token() {
    let fx = fixture();
    let mut client = fx.logged_in(false);

    client.begin_transaction();
    client
        .add_statement(PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("ID"))
        .unwrap();
    let token = client.gen_token(0).unwrap();
    client
        .add_statement(PostStatement::sql(format!(
            "INSERT INTO t2(tid) VALUES({token})"
        )))
        .unwrap();
    client.end_transaction().unwrap();
    assert_eq!(client.returned_values(), ["1"]);

    let rows = client
        .query(QueryPayload::Text("SELECT tid FROM t2".into()))
        .unwrap();
    assert_eq!(rows.value(0, "tid"), Some("1"));
}

#[test]
fn constraint_failure_is_classified() {
    let fx = fixture();
    let mut client = fx.logged_in(false);
    let err = client
        .add_statement(PostStatement::sql("INSERT INTO accounts(name) VALUES(NULL)"))
        .unwrap_err();
    match err {
        ClientError::Rejected { reason, code, .. } => {
            assert_eq!(reason, ErrorReason::ConstrViolationOnUpdate);
            assert_eq!(code, Some(1299));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn wrong_password_is_invalid_credentials() {
    let fx = fixture();
    let mut client = fx.client(false);
    let err = client.login("ann", "nope", None).unwrap_err();
    assert_eq!(err.reason(), Some(ErrorReason::InvalidCredentials));
    assert!(client.session_id().is_empty());
}

#[test]
fn context_params_reach_catalog_statement() {
    let fx = fixture();
    let mut client = fx.logged_in(false);
    client
        .add_statement(PostStatement::sql(
            "INSERT INTO accounts(id, name) VALUES(9, 'zoe')",
        ))
        .unwrap();

    client.params_mut().set_str("name", "zoe");
    let rows = client
        .query(QueryPayload::Definition(PostStatement::sql("accountByName")))
        .unwrap();
    assert_eq!(rows.value(0, "id"), Some("9"));
}

#[test]
fn method_call_ignores_context_params() {
    let fx = fixture();
    let mut client = fx.logged_in(false);
    client.params_mut().set_str("name", "ann");

    client.begin_transaction();
    let mut call = PostStatement::new().with_item(Item::long("n", 21));
    call.set_method("double", Some(OutParams::new(1, 0).with_return()));
    client.add_statement(call).unwrap();
    client
        .add_statement(PostStatement::sql("INSERT INTO t(name) VALUES('a')").with_auto_id("ID"))
        .unwrap();
    client.end_transaction().unwrap();

    assert_eq!(client.returned_values(), ["42", "1"]);
    assert_eq!(client.last_batch()[0].out_values, ["42"]);
}

#[test]
fn binary_payload_survives_the_round_trip() {
    let fx = fixture();
    let mut client = fx.logged_in(true);
    let bytes: Vec<u8> = (0..=255).rev().collect();
    client.add_binary(bytes.clone());
    client
        .add_statement(PostStatement::sql("INSERT INTO photos(photo) VALUES(?)"))
        .unwrap();

    let rows = client
        .query_with_blobs(QueryPayload::Text("SELECT photo FROM photos".into()), &["photo"])
        .unwrap();
    assert_eq!(decode_binary(rows.value(0, "photo").unwrap()).unwrap(), bytes);
}

#[test]
fn cookie_mode_keeps_the_session() {
    let fx = fixture();
    let mut client = fx.logged_in(true);
    let rows = client
        .query(QueryPayload::Text("SELECT 1 AS one".into()))
        .unwrap();
    assert_eq!(rows.value(0, "one"), Some("1"));
    assert_eq!(fx.server.session_count(), 1);
}

#[test]
fn ended_session_reports_expiry() {
    let fx = fixture();
    let mut client = fx.logged_in(false);
    client.end_session().unwrap();
    assert_eq!(fx.server.session_count(), 0);

    let err = client
        .query(QueryPayload::Text("SELECT 1".into()))
        .unwrap_err();
    assert!(err.is_session_expired());
}

#[test]
fn report_without_engine() {
    let fx = fixture();
    let mut client = fx.logged_in(false);
    let err = client
        .report("sales", vec![Item::text("region", "north")])
        .unwrap_err();
    assert_eq!(err.reason(), Some(ErrorReason::NoReportEngine));
}
