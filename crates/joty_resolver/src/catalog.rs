//! JSON catalog files.
//!
//! ```json
//! {
//!   "sharing_field": "tenant",
//!   "literals": { "SCHEMA": "main" },
//!   "statements": [
//!     { "name": "customerById",
//!       "sql": "select * from customers where id = %1$s",
//!       "params": [ { "position": 1, "context": "id" } ],
//!       "updatable_set": "customers" }
//!   ],
//!   "dialogs": [
//!     { "name": "Orders",
//!       "panels": [ { "def": { "name": "head", "sql": "orders" }, "terms": [], "statements": [] } ] }
//!   ]
//! }
//! ```
//!
//! Computed bindings and expression hooks have no file form; register them
//! through [`AccessorBuilder`] instead.

use crate::accessor::{Accessor, AccessorBuilder};
use crate::data_def::{DataDef, DialogDataDef, PanelDataDef};
use crate::error::{ResolverError, ResolverResult};
use crate::template::ParamBinding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A binding in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    /// 1-based placeholder position.
    pub position: usize,
    /// Context parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Literal value, or fallback for an absent context parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
}

/// A statement definition in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefSpec {
    /// Name.
    pub name: String,
    /// SQL text or template.
    pub sql: String,
    /// Placeholder bindings.
    #[serde(default)]
    pub params: Vec<BindingSpec>,
    /// Table written by the statement.
    #[serde(default)]
    pub updatable_set: String,
    /// Skip the sharing filter.
    #[serde(default)]
    pub no_sharing: bool,
}

/// A panel in a catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSpec {
    /// The panel's own definition.
    #[serde(default)]
    pub def: Option<DefSpec>,
    /// Term definitions.
    #[serde(default)]
    pub terms: Vec<DefSpec>,
    /// Statement definitions.
    #[serde(default)]
    pub statements: Vec<DefSpec>,
}

/// A dialog in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSpec {
    /// Name used as the access context.
    pub name: String,
    /// Panels in index order.
    #[serde(default)]
    pub panels: Vec<PanelSpec>,
}

/// A whole catalog file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSpec {
    /// Field carrying the tenant key, in a shared deployment.
    #[serde(default)]
    pub sharing_field: Option<String>,
    /// Literal substitutions.
    #[serde(default)]
    pub literals: BTreeMap<String, String>,
    /// Flat statements.
    #[serde(default)]
    pub statements: Vec<DefSpec>,
    /// Dialogs.
    #[serde(default)]
    pub dialogs: Vec<DialogSpec>,
}

impl CatalogSpec {
    /// Parses a catalog from JSON text.
    pub fn from_json(text: &str) -> ResolverResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a catalog file.
    pub fn load(path: impl AsRef<Path>) -> ResolverResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ResolverError::Catalog(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    /// Fills a builder with the catalog's contents.
    pub fn into_builder(self) -> ResolverResult<AccessorBuilder> {
        let mut builder = Accessor::builder();
        if let Some(field) = self.sharing_field {
            builder = builder.sharing_field(field);
        }
        for (name, value) in self.literals {
            builder = builder.literal(name, value);
        }
        for def in self.statements {
            builder = builder.statement(def.into_def()?);
        }
        for dialog in self.dialogs {
            let mut built = DialogDataDef::new(dialog.name);
            for panel in dialog.panels {
                let mut p = PanelDataDef::new();
                if let Some(def) = panel.def {
                    p = p.with_def(def.into_def()?);
                }
                for term in panel.terms {
                    p = p.with_term(term.into_def()?);
                }
                for stmt in panel.statements {
                    p = p.with_statement(stmt.into_def()?);
                }
                built = built.with_panel(p);
            }
            builder = builder.dialog(built);
        }
        Ok(builder)
    }

    /// Builds the accessor.
    pub fn build(self) -> ResolverResult<Accessor> {
        self.into_builder()?.build()
    }
}

impl DefSpec {
    fn into_def(self) -> ResolverResult<DataDef> {
        let mut def = if self.params.is_empty() {
            DataDef::literal(self.name, self.sql)
        } else {
            let bindings = self
                .params
                .into_iter()
                .map(|b| match (b.context, b.literal) {
                    (Some(name), Some(lit)) => Ok(ParamBinding::context(b.position, name).or_literal(lit)),
                    (Some(name), None) => Ok(ParamBinding::context(b.position, name)),
                    (None, Some(lit)) => Ok(ParamBinding::literal(b.position, lit)),
                    (None, None) => Err(ResolverError::binding(
                        self.name.clone(),
                        format!("position {} has no source", b.position),
                    )),
                })
                .collect::<ResolverResult<Vec<_>>>()?;
            DataDef::template(self.name, &self.sql, bindings)?
        };
        if !self.updatable_set.is_empty() {
            def = def.with_updatable_set(self.updatable_set);
        }
        if self.no_sharing {
            def = def.without_sharing();
        }
        Ok(def)
    }
}
