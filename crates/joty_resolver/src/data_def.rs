//! Statement definitions held by the catalog.

use crate::error::{ResolverError, ResolverResult};
use crate::template::{BoundTemplate, ParamBinding};
use joty_protocol::ParamContext;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Produces SQL programmatically.
///
/// `mode` is the statement's `method` field, which doubles as an open-mode
/// discriminator for query definitions.
pub trait ExprHook: Send + Sync {
    /// Returns the default expression.
    fn expr(&self, ctx: &ParamContext) -> Result<String, String>;

    /// Returns the expression for a mode. Falls back to [`ExprHook::expr`].
    fn selective_expr(&self, mode: &str, ctx: &ParamContext) -> Result<String, String> {
        let _ = mode;
        self.expr(ctx)
    }
}

#[derive(Clone)]
enum DefSource {
    Literal(String),
    Template(BoundTemplate),
    Hook(Arc<dyn ExprHook>),
}

impl fmt::Debug for DefSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefSource::Literal(sql) => f.debug_tuple("Literal").field(sql).finish(),
            DefSource::Template(t) => f.debug_tuple("Template").field(&t.template().source()).finish(),
            DefSource::Hook(_) => f.write_str("Hook"),
        }
    }
}

/// A named statement definition.
#[derive(Debug, Clone)]
pub struct DataDef {
    name: String,
    source: DefSource,
    updatable_set: String,
    no_sharing: bool,
}

impl DataDef {
    /// A fixed SQL string.
    pub fn literal(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::with_source(name.into(), DefSource::Literal(sql.into()))
    }

    /// A template with bindings, validated now.
    pub fn template(
        name: impl Into<String>,
        template: &str,
        bindings: Vec<ParamBinding>,
    ) -> ResolverResult<Self> {
        let name = name.into();
        let bound = BoundTemplate::new(&name, template, bindings)?;
        Ok(Self::with_source(name, DefSource::Template(bound)))
    }

    /// An expression hook.
    pub fn hook(name: impl Into<String>, hook: Arc<dyn ExprHook>) -> Self {
        Self::with_source(name.into(), DefSource::Hook(hook))
    }

    fn with_source(name: String, source: DefSource) -> Self {
        Self {
            name,
            source,
            updatable_set: String::new(),
            no_sharing: false,
        }
    }

    /// Sets the table written by this definition.
    pub fn with_updatable_set(mut self, set: impl Into<String>) -> Self {
        self.updatable_set = set.into();
        self
    }

    /// Excludes this definition from the sharing-key filter.
    pub fn without_sharing(mut self) -> Self {
        self.no_sharing = true;
        self
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table written by this definition; empty when none.
    pub fn updatable_set(&self) -> &str {
        &self.updatable_set
    }

    /// Whether the sharing filter is skipped.
    pub fn no_sharing(&self) -> bool {
        self.no_sharing
    }

    /// Produces the SQL text for a mode.
    pub fn statement(&self, mode: &str, ctx: &ParamContext) -> ResolverResult<String> {
        match &self.source {
            DefSource::Literal(sql) => Ok(sql.clone()),
            DefSource::Template(bound) => bound.render(ctx),
            DefSource::Hook(hook) => {
                let result = if mode.is_empty() {
                    hook.expr(ctx)
                } else {
                    hook.selective_expr(mode, ctx)
                };
                result.map_err(|message| ResolverError::Hook {
                    name: self.name.clone(),
                    message,
                })
            }
        }
    }
}

/// Definitions of one panel: its own, per term, and per statement name.
#[derive(Debug, Clone, Default)]
pub struct PanelDataDef {
    def: Option<DataDef>,
    terms: HashMap<String, DataDef>,
    statements: HashMap<String, DataDef>,
}

impl PanelDataDef {
    /// Creates an empty panel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the panel's own definition.
    pub fn with_def(mut self, def: DataDef) -> Self {
        self.def = Some(def);
        self
    }

    /// Adds a term definition keyed by its name.
    pub fn with_term(mut self, def: DataDef) -> Self {
        self.terms.insert(def.name().to_string(), def);
        self
    }

    /// Adds a statement definition keyed by its name.
    pub fn with_statement(mut self, def: DataDef) -> Self {
        self.statements.insert(def.name().to_string(), def);
        self
    }

    /// The panel's own definition.
    pub fn def(&self) -> Option<&DataDef> {
        self.def.as_ref()
    }

    /// A term definition.
    pub fn term(&self, name: &str) -> Option<&DataDef> {
        self.terms.get(name)
    }

    /// A statement definition.
    pub fn statement(&self, name: &str) -> Option<&DataDef> {
        self.statements.get(name)
    }
}

/// Ordered panels of a dialog.
#[derive(Debug, Clone)]
pub struct DialogDataDef {
    name: String,
    panels: Vec<PanelDataDef>,
}

impl DialogDataDef {
    /// Creates a dialog with no panels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            panels: Vec::new(),
        }
    }

    /// Appends a panel.
    pub fn with_panel(mut self, panel: PanelDataDef) -> Self {
        self.panels.push(panel);
        self
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Panel by index.
    pub fn panel(&self, index: i32) -> Option<&PanelDataDef> {
        usize::try_from(index).ok().and_then(|i| self.panels.get(i))
    }

    /// Number of panels.
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }
}
