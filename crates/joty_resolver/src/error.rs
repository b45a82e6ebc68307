//! Error types for the resolver.

use thiserror::Error;

/// Result type for resolver operations.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Errors raised while building a catalog or resolving a statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// A template string is malformed.
    #[error("invalid template {template:?}: {message}")]
    TemplateSyntax {
        /// The template.
        template: String,
        /// What is wrong.
        message: String,
    },

    /// Bindings do not cover the template's placeholders one to one.
    #[error("bindings of {name:?} do not match its template: {message}")]
    BindingMismatch {
        /// Statement name.
        name: String,
        /// What is wrong.
        message: String,
    },

    /// The same name was registered twice.
    #[error("duplicate definition: {0}")]
    Duplicate(String),

    /// A dialog is not in the catalog.
    #[error("unknown dialog: {0}")]
    UnknownDialog(String),

    /// A panel index is out of range.
    #[error("dialog {dialog} has no panel {index}")]
    UnknownPanel {
        /// Dialog name.
        dialog: String,
        /// Requested panel.
        index: i32,
    },

    /// A coordinate or name did not resolve.
    #[error("cannot resolve {0}")]
    Unresolved(String),

    /// An expression hook refused to produce SQL.
    #[error("expression hook of {name:?} failed: {message}")]
    Hook {
        /// Statement name.
        name: String,
        /// Hook message.
        message: String,
    },

    /// A catalog file could not be read.
    #[error("invalid catalog: {0}")]
    Catalog(String),
}

impl ResolverError {
    /// Create a template syntax error.
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TemplateSyntax {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a binding mismatch error.
    pub fn binding(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BindingMismatch {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Catalog(err.to_string())
    }
}
