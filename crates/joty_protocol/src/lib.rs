//! # Joty Protocol
//!
//! Types and codecs of the Joty posted-statement protocol.
//!
//! A client ships database work to the server as XML over HTTP:
//! - [`PostStatement`] describes one action: SQL text or a resolver
//!   coordinate, typed [`Item`] parameters, an optional method call, an
//!   auto-id request and a [`RollbackTag`] for compensation
//! - [`Request`] groups statements (or a query, or report parameters) under
//!   `<JotyReq>` and the [`Command`] travels in the query string
//! - [`Response`] carries the outcome, generated ids or rows, and the
//!   session id under `<JotyResp>`
//!
//! [`ParamContext`] is the named parameter store shared by the statements
//! of a batch on both sides of the wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binary;
mod command;
mod error;
mod gen_id;
mod item;
mod messages;
mod params;
mod reason;
mod result_set;
mod statement;

pub use binary::{decode_binary, encode_binary};
pub use command::{
    split_session_path, with_session_path, Command, RequestParams, COMMAND_PARAM, SESSION_COOKIE,
    SESSION_PATH_PARAM,
};
pub use error::{ProtocolError, ProtocolResult};
pub use gen_id::{gen_token, substitute_gen_ids};
pub use item::{quote_sql, unquote_sql, Item, ItemType, ItemValue};
pub use messages::{
    Outcome, QueryPayload, Request, RequestBody, Response, ResponsePayload, REQUEST_ROOT,
    RESPONSE_ROOT,
};
pub use params::{ContextParam, ParamContext, ParamKind, MISSING};
pub use reason::{ErrorReason, NO_REPORT_ENGINE_MARKER, SESSION_EXPIRED_MARKER};
pub use result_set::{FieldDesc, ResultSet};
pub use statement::{OutParams, PostStatement, RollbackTag, NO_PAGINATION};
