//! # Joty XML
//!
//! Minimal XML element codec used by the Joty wire protocol.
//!
//! The protocol exchanges small, machine-generated documents, so this crate
//! implements exactly the subset it needs:
//! - Elements with attributes, text and child elements
//! - The five predefined entities plus decimal/hex character references
//! - CDATA sections, comments, processing instructions and a DOCTYPE line
//!   (skipped)
//! - Compact output with a UTF-8 declaration
//!
//! Characters that XML 1.0 cannot carry literally (carriage return and
//! other control characters) are written as character references so text
//! survives a round trip byte for byte.
//!
//! ## Usage
//!
//! ```
//! use joty_xml::{from_xml, to_xml, Element};
//!
//! let root = Element::new("JotyReq").with_child(Element::leaf("QueryStmnt", "select 1"));
//! let text = to_xml(&root);
//! let decoded = from_xml(&text).unwrap();
//! assert_eq!(root, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod element;
mod encoder;
mod error;

pub use decoder::{from_xml, unescape, XmlDecoder};
pub use element::Element;
pub use encoder::{escape, to_xml, XmlEncoder, DECLARATION};
pub use error::{XmlError, XmlResult};
