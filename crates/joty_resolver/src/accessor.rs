//! The accessor: maps statement coordinates to SQL.
//!
//! # Resolution order
//!
//! 1. SQL containing `<JOTY_CTX>` gets the marker replaced by the updatable
//!    set of the coordinate's definition (term, else panel) or, without
//!    coordinates, of the flat definition named by the statement's method.
//! 2. With coordinates (non-empty access context):
//!    - term name and empty SQL: the panel's term definition
//!    - term name and single-word SQL: the flat statement map
//!    - no term name and single-word SQL: the panel's statement map, then
//!      the flat map
//!    - no term name and empty SQL: the panel's own definition
//! 3. Without coordinates, single-word SQL found in the flat map resolves to
//!    that definition.
//! 4. Anything else is literal SQL and passes through.
//!
//! Literal-map entries `<NAME>` are substituted last.
//!
//! The accessor is immutable once built and shared across requests; the only
//! mutable state is the sharing-violation counter.

use crate::data_def::{DataDef, DialogDataDef, PanelDataDef};
use crate::dialect::{is_single_word, Dialect};
use crate::error::{ResolverError, ResolverResult};
use joty_protocol::{quote_sql, ParamContext, PostStatement};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Marker replaced by the updatable set of the addressed definition.
pub const CTX_MARKER: &str = "<JOTY_CTX>";

/// Predicate substituted for the sharing filter after a violation.
pub const UNSATISFIABLE: &str = "1 = 0";

/// Per-request settings passed into query composition.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Dialect of the target database.
    pub dialect: Dialect,
    /// Rows per page.
    pub page_size: u32,
    /// Tenant key of the session, in a shared deployment.
    pub sharing_key: Option<String>,
}

impl RequestContext {
    /// Creates a context for a dialect.
    pub fn new(dialect: Dialect, page_size: u32) -> Self {
        Self {
            dialect,
            page_size,
            sharing_key: None,
        }
    }

    /// Sets the tenant key.
    pub fn with_sharing_key(mut self, key: impl Into<String>) -> Self {
        self.sharing_key = Some(key.into());
        self
    }
}

/// Outcome of a resolution.
#[derive(Debug)]
pub struct Resolved<'a> {
    /// SQL to execute.
    pub sql: String,
    /// The definition it came from; `None` for literal SQL.
    pub def: Option<&'a DataDef>,
}

/// Builds an [`Accessor`].
#[derive(Debug, Default)]
pub struct AccessorBuilder {
    dialogs: Vec<DialogDataDef>,
    statements: Vec<DataDef>,
    literals: Vec<(String, String)>,
    sharing_field: Option<String>,
}

impl AccessorBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a dialog.
    pub fn dialog(mut self, dialog: DialogDataDef) -> Self {
        self.dialogs.push(dialog);
        self
    }

    /// Adds a flat statement definition.
    pub fn statement(mut self, def: DataDef) -> Self {
        self.statements.push(def);
        self
    }

    /// Adds a literal substitution for `<name>`.
    pub fn literal(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.literals.push((name.into(), value.into()));
        self
    }

    /// Enables the sharing-key filter on `field`.
    pub fn sharing_field(mut self, field: impl Into<String>) -> Self {
        self.sharing_field = Some(field.into());
        self
    }

    /// Builds the accessor, rejecting duplicate names.
    pub fn build(self) -> ResolverResult<Accessor> {
        let mut dialogs = HashMap::new();
        for dialog in self.dialogs {
            let name = dialog.name().to_string();
            if dialogs.insert(name.clone(), dialog).is_some() {
                return Err(ResolverError::Duplicate(format!("dialog {name}")));
            }
        }
        let mut statements = HashMap::new();
        for def in self.statements {
            let name = def.name().to_string();
            if statements.insert(name.clone(), def).is_some() {
                return Err(ResolverError::Duplicate(format!("statement {name}")));
            }
        }
        let mut literals = HashMap::new();
        for (name, value) in self.literals {
            if literals.insert(name.clone(), value).is_some() {
                return Err(ResolverError::Duplicate(format!("literal {name}")));
            }
        }
        Ok(Accessor {
            dialogs,
            statements,
            literals,
            sharing_field: self.sharing_field,
            violations: AtomicU64::new(0),
        })
    }
}

/// The statement catalog.
#[derive(Debug, Default)]
pub struct Accessor {
    dialogs: HashMap<String, DialogDataDef>,
    statements: HashMap<String, DataDef>,
    literals: HashMap<String, String>,
    sharing_field: Option<String>,
    violations: AtomicU64,
}

impl Accessor {
    /// Starts a builder.
    pub fn builder() -> AccessorBuilder {
        AccessorBuilder::new()
    }

    /// A flat statement definition.
    pub fn statement_def(&self, name: &str) -> Option<&DataDef> {
        self.statements.get(name)
    }

    /// Whether rows are partitioned by a sharing field.
    pub fn is_shared(&self) -> bool {
        self.sharing_field.is_some()
    }

    /// Number of sharing violations seen so far.
    pub fn sharing_violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Resolves a statement to SQL; `None` when nothing matches.
    pub fn resolve(&self, stmt: &PostStatement, ctx: &ParamContext) -> ResolverResult<Option<String>> {
        Ok(self.resolve_detailed(stmt, ctx)?.map(|r| r.sql))
    }

    /// Resolves a statement, keeping the definition it came from.
    pub fn resolve_detailed(
        &self,
        stmt: &PostStatement,
        ctx: &ParamContext,
    ) -> ResolverResult<Option<Resolved<'_>>> {
        let sql = stmt.sql.trim();
        let mode = stmt.method.as_str();

        if sql.contains(CTX_MARKER) {
            let target = if stmt.has_coordinates() {
                let panel = self.panel(stmt)?;
                if stmt.term_name.is_empty() {
                    panel.def()
                } else {
                    panel.term(&stmt.term_name)
                }
            } else {
                self.statements.get(mode)
            };
            return Ok(target
                .filter(|def| !def.updatable_set().is_empty())
                .map(|def| Resolved {
                    sql: self.substitute_literals(sql.replace(CTX_MARKER, def.updatable_set())),
                    def: Some(def),
                }));
        }

        let def = if stmt.has_coordinates() {
            let panel = self.panel(stmt)?;
            match (stmt.term_name.is_empty(), sql.is_empty(), is_single_word(sql)) {
                (false, true, _) => panel.term(&stmt.term_name),
                (false, false, true) => self.statements.get(sql),
                (true, false, true) => panel
                    .statement(sql)
                    .or_else(|| self.statements.get(sql)),
                (true, true, _) => panel.def(),
                (_, false, false) => None,
            }
        } else if is_single_word(sql) {
            self.statements.get(sql)
        } else {
            None
        };

        match def {
            Some(def) => {
                let text = def.statement(mode, ctx)?;
                debug!(def = def.name(), "resolved statement");
                Ok(Some(Resolved {
                    sql: self.substitute_literals(text),
                    def: Some(def),
                }))
            }
            None if sql.is_empty() => Ok(None),
            None if stmt.has_coordinates() && is_single_word(sql) => Ok(None),
            None => Ok(Some(Resolved {
                sql: self.substitute_literals(sql.to_string()),
                def: None,
            })),
        }
    }

    /// Composes the query for a query definition: resolved set, filter,
    /// sharing filter, sort and page.
    pub fn compose_query(
        &self,
        stmt: &PostStatement,
        ctx: &ParamContext,
        request: &RequestContext,
    ) -> ResolverResult<Option<String>> {
        let Some(resolved) = self.resolve_detailed(stmt, ctx)? else {
            return Ok(None);
        };
        let mut conditions = Vec::new();
        if !stmt.main_filter.trim().is_empty() {
            conditions.push(stmt.main_filter.trim().to_string());
        }
        if let Some(filter) = self.sharing_filter(resolved.def, ctx, request) {
            conditions.push(filter);
        }
        let where_clause = match conditions.len() {
            0 => String::new(),
            1 => conditions.remove(0),
            _ => conditions
                .iter()
                .map(|c| format!("({c})"))
                .collect::<Vec<_>>()
                .join(" AND "),
        };
        Ok(Some(request.dialect.search_sql(
            &resolved.sql,
            &where_clause,
            &stmt.sort_expr,
            stmt.iteration,
            request.page_size,
        )))
    }

    /// The sharing filter for a definition, if the deployment is shared.
    ///
    /// A context parameter named after the sharing field that disagrees with
    /// the session's key is a violation: it is counted, logged and answered
    /// with an unsatisfiable predicate.
    pub fn sharing_filter(
        &self,
        def: Option<&DataDef>,
        ctx: &ParamContext,
        request: &RequestContext,
    ) -> Option<String> {
        let field = self.sharing_field.as_deref()?;
        if def.is_some_and(DataDef::no_sharing) {
            return None;
        }
        let key = request.sharing_key.as_deref()?;
        if let Some(presented) = ctx.lookup(field) {
            if presented.value != key {
                self.violations.fetch_add(1, Ordering::Relaxed);
                warn!(
                    field,
                    presented = %presented.value,
                    "sharing key violation"
                );
                return Some(UNSATISFIABLE.to_string());
            }
        }
        Some(format!("{field} = {}", quote_sql(key)))
    }

    fn panel(&self, stmt: &PostStatement) -> ResolverResult<&PanelDataDef> {
        let dialog = self
            .dialogs
            .get(&stmt.access_context)
            .ok_or_else(|| ResolverError::UnknownDialog(stmt.access_context.clone()))?;
        dialog
            .panel(stmt.panel_index)
            .ok_or_else(|| ResolverError::UnknownPanel {
                dialog: stmt.access_context.clone(),
                index: stmt.panel_index,
            })
    }

    fn substitute_literals(&self, mut sql: String) -> String {
        if !sql.contains('<') {
            return sql;
        }
        for (name, value) in &self.literals {
            let marker = format!("<{name}>");
            if sql.contains(&marker) {
                sql = sql.replace(&marker, value);
            }
        }
        sql
    }
}
