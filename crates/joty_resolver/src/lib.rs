//! # Joty Resolver
//!
//! The server-side statement catalog. Clients address work by logical
//! coordinates (dialog, panel, term) or by statement name; the [`Accessor`]
//! turns those into SQL so the database namespace stays hidden.
//!
//! - [`DataDef`]: a literal, a [`BoundTemplate`] with explicit
//!   [`ParamBinding`]s, or an [`ExprHook`]
//! - [`PanelDataDef`] / [`DialogDataDef`]: coordinate-addressed definitions
//! - [`Dialect`]: paged query composition
//! - [`CatalogSpec`]: JSON catalog files
//!
//! The accessor is built once and shared read-only across requests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod accessor;
mod catalog;
mod data_def;
mod dialect;
mod error;
mod template;

pub use accessor::{
    Accessor, AccessorBuilder, RequestContext, Resolved, CTX_MARKER, UNSATISFIABLE,
};
pub use catalog::{BindingSpec, CatalogSpec, DefSpec, DialogSpec, PanelSpec};
pub use data_def::{DataDef, DialogDataDef, ExprHook, PanelDataDef};
pub use dialect::{is_single_word, set_expression, Dialect, SET_ALIAS};
pub use error::{ResolverError, ResolverResult};
pub use template::{BoundTemplate, ComputeFn, ParamBinding, SqlTemplate};
