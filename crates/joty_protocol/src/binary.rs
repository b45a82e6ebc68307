//! Binary payload encoding.
//!
//! Payloads are carried as base64 of the raw bytes. Reading a byte string as
//! ISO-8859-1 text maps each byte to one code point below 256, so the
//! single-byte text form and the raw bytes share one base64 encoding and
//! arbitrary byte values survive the XML channel.

use crate::error::{ProtocolError, ProtocolResult};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Encodes a payload for a `<Binary>` or `<Report>` node.
pub fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes a `<Binary>` or `<Report>` node.
pub fn decode_binary(text: &str) -> ProtocolResult<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ProtocolError::Binary(e.to_string()))
}
