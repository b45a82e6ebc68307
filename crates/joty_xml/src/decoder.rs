//! XML decoder.

use crate::element::{is_name_char, is_valid_name, Element};
use crate::error::{XmlError, XmlResult};

/// Maximum element nesting accepted from untrusted input.
const MAX_DEPTH: usize = 128;

/// Decode an XML document into its root element.
///
/// # Errors
///
/// Returns an error if the document is not well formed, nests deeper than
/// the decoder limit, or carries content after the root element.
pub fn from_xml(input: &str) -> XmlResult<Element> {
    let mut decoder = XmlDecoder::new(input);
    decoder.document()
}

/// A recursive-descent decoder over a borrowed document.
pub struct XmlDecoder<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> XmlDecoder<'a> {
    /// Create a new decoder for the given document.
    pub fn new(input: &'a str) -> Self {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        Self { input, pos: 0 }
    }

    /// Decode a complete document: prolog, root element, trailing misc.
    pub fn document(&mut self) -> XmlResult<Element> {
        self.skip_misc()?;
        let root = self.element(0)?;
        self.skip_misc()?;
        if self.pos < self.input.len() {
            return Err(XmlError::TrailingContent(self.pos));
        }
        Ok(root)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> XmlResult<char> {
        let c = self.peek().ok_or(XmlError::UnexpectedEof)?;
        self.pos += c.len_utf8();
        Ok(c)
    }

    fn expect(&mut self, expected: char) -> XmlResult<()> {
        let position = self.pos;
        let c = self.bump()?;
        if c == expected {
            Ok(())
        } else {
            Err(XmlError::unexpected(format!("{expected:?}"), c, position))
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    /// Advance past `terminator`, returning the text before it.
    fn take_until(&mut self, terminator: &str) -> XmlResult<&'a str> {
        let rest = self.rest();
        let end = rest.find(terminator).ok_or(XmlError::UnexpectedEof)?;
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    /// Skip declarations, processing instructions, comments, doctype and whitespace.
    fn skip_misc(&mut self) -> XmlResult<()> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("<?") {
                self.take_until("?>")?;
            } else if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<!DOCTYPE") {
                self.take_until(">")?;
            } else {
                return Ok(());
            }
        }
    }

    fn name(&mut self) -> XmlResult<String> {
        let rest = self.rest();
        let end = rest
            .char_indices()
            .find(|&(_, c)| !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        let name = &rest[..end];
        if !is_valid_name(name) {
            return match self.peek() {
                Some(c) => Err(XmlError::unexpected("a name", c, self.pos)),
                None => Err(XmlError::UnexpectedEof),
            };
        }
        self.pos += end;
        Ok(name.to_string())
    }

    fn element(&mut self, depth: usize) -> XmlResult<Element> {
        if depth >= MAX_DEPTH {
            return Err(XmlError::TooDeep(MAX_DEPTH));
        }
        self.expect('<')?;
        let mut element = Element::new(self.name()?);

        // Attributes.
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('/') => {
                    self.bump()?;
                    self.expect('>')?;
                    return Ok(element);
                }
                Some('>') => {
                    self.bump()?;
                    break;
                }
                Some(_) => {
                    let name = self.name()?;
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    let value = self.attribute_value()?;
                    element.attributes.push((name, value));
                }
                None => return Err(XmlError::UnexpectedEof),
            }
        }

        // Content.
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                return Err(XmlError::UnexpectedEof);
            } else if rest.starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                if closing != element.name {
                    return Err(XmlError::MismatchedTag {
                        expected: element.name,
                        found: closing,
                    });
                }
                self.skip_whitespace();
                self.expect('>')?;
                break;
            } else if rest.starts_with("<!--") {
                self.take_until("-->")?;
            } else if rest.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let raw = self.take_until("]]>")?;
                element.text.push_str(raw);
            } else if rest.starts_with('<') {
                let child = self.element(depth + 1)?;
                element.children.push(child);
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                let raw = &rest[..end];
                self.pos += end;
                unescape_into(&mut element.text, raw)?;
            }
        }

        if !element.children.is_empty() && element.text.trim().is_empty() {
            element.text.clear();
        }
        Ok(element)
    }

    fn attribute_value(&mut self) -> XmlResult<String> {
        let position = self.pos;
        let quote = self.bump()?;
        if quote != '"' && quote != '\'' {
            return Err(XmlError::unexpected("a quote", quote, position));
        }
        let rest = self.rest();
        let end = rest.find(quote).ok_or(XmlError::UnexpectedEof)?;
        let raw = &rest[..end];
        if raw.contains('<') {
            return Err(XmlError::malformed("'<' inside attribute value"));
        }
        self.pos += end + 1;
        let mut value = String::with_capacity(raw.len());
        unescape_into(&mut value, raw)?;
        Ok(value)
    }
}

/// Replace entity and character references in `raw`.
pub fn unescape(raw: &str) -> XmlResult<String> {
    let mut out = String::with_capacity(raw.len());
    unescape_into(&mut out, raw)?;
    Ok(out)
}

fn unescape_into(out: &mut String, raw: &str) -> XmlResult<()> {
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| XmlError::InvalidEntity(after.chars().take(8).collect()))?;
        let entity = &after[..semi];
        out.push(resolve_entity(entity)?);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(())
}

fn resolve_entity(entity: &str) -> XmlResult<char> {
    let invalid = || XmlError::InvalidEntity(entity.to_string());
    match entity {
        "amp" => Ok('&'),
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).map_err(|_| invalid())?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().map_err(|_| invalid())?
            } else {
                return Err(invalid());
            };
            char::from_u32(code).ok_or_else(invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_nested_document() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
            <JotyResp>
              <Result><Value>Ok</Value><Reason/><Code>0</Code></Result>
              <S_ID>abc</S_ID>
            </JotyResp>"#;
        let root = from_xml(doc).unwrap();
        assert_eq!(root.name, "JotyResp");
        assert_eq!(root.text, "");
        let result = root.child("Result").unwrap();
        assert_eq!(result.child_text("Value"), Some("Ok"));
        assert_eq!(result.child_text("Reason"), Some(""));
        assert_eq!(root.child_text("S_ID"), Some("abc"));
    }

    #[test]
    fn leaf_text_keeps_whitespace() {
        let root = from_xml("<Val>  padded  </Val>").unwrap();
        assert_eq!(root.text, "  padded  ");
    }

    #[test]
    fn decodes_entities_and_references() {
        let root = from_xml("<a>&lt;GenID1&gt; &amp; &#65;&#x42; &apos;&quot;</a>").unwrap();
        assert_eq!(root.text, "<GenID1> & AB '\"");
    }

    #[test]
    fn decodes_attributes_with_both_quotes() {
        let root = from_xml(r#"<Field name="id" len='10' dec="0"/>"#).unwrap();
        assert_eq!(root.attr("name"), Some("id"));
        assert_eq!(root.attr("len"), Some("10"));
        assert_eq!(root.attr("dec"), Some("0"));
    }

    #[test]
    fn cdata_is_raw() {
        let root = from_xml("<q><![CDATA[a < b & c]]></q>").unwrap();
        assert_eq!(root.text, "a < b & c");
    }

    #[test]
    fn comments_are_skipped() {
        let root = from_xml("<!-- head --><a><!-- in --><b>1</b></a><!-- tail -->").unwrap();
        assert_eq!(root.child_text("b"), Some("1"));
    }

    #[test]
    fn rejects_mismatched_tags() {
        let err = from_xml("<a><b></a></b>").unwrap_err();
        assert!(matches!(err, XmlError::MismatchedTag { .. }));
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(from_xml("<a><b>text").unwrap_err(), XmlError::UnexpectedEof);
    }

    #[test]
    fn rejects_unknown_entity() {
        assert!(matches!(
            from_xml("<a>&nbsp;</a>").unwrap_err(),
            XmlError::InvalidEntity(_)
        ));
    }

    #[test]
    fn rejects_trailing_content() {
        assert!(matches!(
            from_xml("<a/><b/>").unwrap_err(),
            XmlError::TrailingContent(_)
        ));
    }

    #[test]
    fn rejects_excessive_depth() {
        let open = "<a>".repeat(MAX_DEPTH + 1);
        let close = "</a>".repeat(MAX_DEPTH + 1);
        let err = from_xml(&format!("{open}{close}")).unwrap_err();
        assert_eq!(err, XmlError::TooDeep(MAX_DEPTH));
    }
}
