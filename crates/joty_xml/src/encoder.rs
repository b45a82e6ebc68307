//! XML encoder.

use crate::element::Element;

/// The declaration written at the top of every document.
pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Encode an element tree to a complete XML document.
///
/// Output is compact (no indentation) so leaf text is never padded with
/// whitespace the decoder would have to guess about.
pub fn to_xml(root: &Element) -> String {
    let mut encoder = XmlEncoder::new();
    encoder.declaration();
    encoder.encode(root);
    encoder.into_string()
}

/// A streaming XML encoder.
pub struct XmlEncoder {
    buffer: String,
}

impl XmlEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: String::with_capacity(capacity),
        }
    }

    /// Write the XML declaration.
    pub fn declaration(&mut self) {
        self.buffer.push_str(DECLARATION);
    }

    /// Encode an element and its subtree.
    pub fn encode(&mut self, element: &Element) {
        self.buffer.push('<');
        self.buffer.push_str(&element.name);
        for (name, value) in &element.attributes {
            self.buffer.push(' ');
            self.buffer.push_str(name);
            self.buffer.push_str("=\"");
            escape_into(&mut self.buffer, value, true);
            self.buffer.push('"');
        }

        if element.text.is_empty() && element.children.is_empty() {
            self.buffer.push_str("/>");
            return;
        }

        self.buffer.push('>');
        escape_into(&mut self.buffer, &element.text, false);
        for child in &element.children {
            self.encode(child);
        }
        self.buffer.push_str("</");
        self.buffer.push_str(&element.name);
        self.buffer.push('>');
    }

    /// Consume this encoder and return the document.
    pub fn into_string(self) -> String {
        self.buffer
    }

    /// Get a reference to the encoded text.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

impl Default for XmlEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Escape `text` for use as character data or an attribute value.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text, true);
    out
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\'' if attribute => out.push_str("&apos;"),
            // Carriage returns and control characters would be normalised
            // or rejected by a conforming reader; keep them as references.
            '\r' => out.push_str("&#13;"),
            '\t' | '\n' if !attribute => out.push(c),
            c if (c as u32) < 0x20 => {
                out.push_str("&#");
                out.push_str(&(c as u32).to_string());
                out.push(';');
            }
            c => out.push(c),
        }
    }
}
