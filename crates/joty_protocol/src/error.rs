//! Error types for the protocol crate.

use joty_xml::XmlError;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while building or reading protocol documents.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The document is not well-formed XML.
    #[error("xml error: {0}")]
    Xml(#[from] XmlError),

    /// The root element is not the one the protocol expects.
    #[error("invalid root element: expected <{expected}>, found <{found}>")]
    InvalidRoot {
        /// Expected root name.
        expected: &'static str,
        /// Root name found.
        found: String,
    },

    /// A required node is absent.
    #[error("missing <{expected}> in <{parent}>")]
    MissingNode {
        /// Enclosing element.
        parent: String,
        /// Name of the missing node.
        expected: String,
    },

    /// A node appears where a different one is required.
    #[error("unexpected <{found}>, expected <{expected}>")]
    UnexpectedNode {
        /// Node the reader expected at this position.
        expected: String,
        /// Node actually found.
        found: String,
    },

    /// A field value that cannot be interpreted.
    #[error("invalid value {value:?} for {field}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Offending value.
        value: String,
    },

    /// Base64 payload could not be decoded.
    #[error("invalid binary payload: {0}")]
    Binary(String),

    /// A `'<GenIDn>'` token references an id that was never generated.
    #[error("generated id {index} referenced but only {available} available")]
    GenIdOutOfRange {
        /// 1-based index in the token.
        index: usize,
        /// Number of ids generated so far.
        available: usize,
    },
}

impl ProtocolError {
    /// Create a missing-node error.
    pub fn missing(parent: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::MissingNode {
            parent: parent.into(),
            expected: expected.into(),
        }
    }

    /// Create an invalid-field error.
    pub fn invalid_field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }
}
