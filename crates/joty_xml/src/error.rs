//! Error types for the XML codec.

use thiserror::Error;

/// Result type for XML operations.
pub type XmlResult<T> = Result<T, XmlError>;

/// Errors that can occur while decoding an XML document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    /// Input ended in the middle of a construct.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A character that does not fit the grammar at this position.
    #[error("unexpected character {found:?} at byte {position}, expected {expected}")]
    UnexpectedChar {
        /// What the reader was looking for.
        expected: String,
        /// The character actually found.
        found: char,
        /// Byte offset in the input.
        position: usize,
    },

    /// A closing tag that does not match the open element.
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedTag {
        /// Name of the element being closed.
        expected: String,
        /// Name found in the closing tag.
        found: String,
    },

    /// Unknown or malformed entity / character reference.
    #[error("invalid entity reference: &{0};")]
    InvalidEntity(String),

    /// Element or attribute name violates the name grammar.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// Element nesting exceeds the decoder limit.
    #[error("element nesting deeper than {0} levels")]
    TooDeep(usize),

    /// Non-whitespace content after the root element.
    #[error("trailing content after root element at byte {0}")]
    TrailingContent(usize),

    /// Any other structural problem.
    #[error("malformed document: {message}")]
    Malformed {
        /// Description of the problem.
        message: String,
    },
}

impl XmlError {
    /// Create a malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create an unexpected-character error.
    pub fn unexpected(expected: impl Into<String>, found: char, position: usize) -> Self {
        Self::UnexpectedChar {
            expected: expected.into(),
            found,
            position,
        }
    }
}
