//! Typed statement parameters.

use crate::error::{ProtocolError, ProtocolResult};
use joty_xml::Element;

/// Declared type of an [`Item`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemType {
    /// Character data.
    #[default]
    Text,
    /// 64-bit integer.
    Long,
    /// Floating point.
    Double,
    /// Date or timestamp literal.
    Date,
}

impl ItemType {
    /// Returns the wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Text => "text",
            ItemType::Long => "long",
            ItemType::Double => "double",
            ItemType::Date => "date",
        }
    }

    /// Parses the wire spelling (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Some(ItemType::Text),
            "long" => Some(ItemType::Long),
            "double" => Some(ItemType::Double),
            "date" => Some(ItemType::Date),
            _ => None,
        }
    }
}

/// A parsed item value.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    /// Text, with SQL quoting removed.
    Text(String),
    /// Integer.
    Long(i64),
    /// Floating point.
    Double(f64),
    /// Date literal, with SQL quoting removed.
    Date(String),
}

impl ItemValue {
    /// Returns the type of this value.
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemValue::Text(_) => ItemType::Text,
            ItemValue::Long(_) => ItemType::Long,
            ItemValue::Double(_) => ItemType::Double,
            ItemValue::Date(_) => ItemType::Date,
        }
    }

    /// Renders the value as an unquoted literal.
    pub fn literal(&self) -> String {
        match self {
            ItemValue::Text(s) | ItemValue::Date(s) => s.clone(),
            ItemValue::Long(n) => n.to_string(),
            ItemValue::Double(d) => d.to_string(),
        }
    }
}

/// A named, typed parameter carried by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    /// Parameter name.
    pub name: String,
    /// Value as sent on the wire.
    pub value: String,
    /// Declared type.
    pub item_type: ItemType,
}

impl Item {
    /// Creates a new item.
    pub fn new(name: impl Into<String>, value: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            item_type,
        }
    }

    /// Creates a text item.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, ItemType::Text)
    }

    /// Creates an integer item.
    pub fn long(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, value.to_string(), ItemType::Long)
    }

    /// Creates a floating point item.
    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, value.to_string(), ItemType::Double)
    }

    /// Creates a date item.
    pub fn date(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, ItemType::Date)
    }

    /// Parses the literal according to the declared type.
    pub fn value(&self) -> ProtocolResult<ItemValue> {
        let invalid = || ProtocolError::invalid_field(self.name.clone(), self.value.clone());
        match self.item_type {
            ItemType::Text => Ok(ItemValue::Text(self.unquoted())),
            ItemType::Date => Ok(ItemValue::Date(self.unquoted())),
            ItemType::Long => self
                .value
                .trim()
                .parse::<i64>()
                .map(ItemValue::Long)
                .map_err(|_| invalid()),
            ItemType::Double => self
                .value
                .trim()
                .parse::<f64>()
                .map(ItemValue::Double)
                .map_err(|_| invalid()),
        }
    }

    /// Returns the literal with SQL quoting stripped for text and date items.
    ///
    /// `'O''Brien'` becomes `O'Brien`; numeric items are returned unchanged.
    pub fn unquoted(&self) -> String {
        match self.item_type {
            ItemType::Text | ItemType::Date => unquote_sql(&self.value),
            ItemType::Long | ItemType::Double => self.value.clone(),
        }
    }

    /// Encodes as an `<Item>` element.
    pub fn to_element(&self) -> Element {
        Element::new("Item")
            .with_child(Element::leaf("Name", self.name.clone()))
            .with_child(Element::leaf("Val", self.value.clone()))
            .with_child(Element::leaf("Type", self.item_type.as_str()))
    }

    /// Decodes from an `<Item>` element.
    pub fn from_element(element: &Element) -> ProtocolResult<Self> {
        let field = |name: &str| {
            element
                .child_text(name)
                .ok_or_else(|| ProtocolError::missing("Item", name))
        };
        let type_text = field("Type")?;
        let item_type =
            ItemType::parse(type_text).ok_or_else(|| ProtocolError::invalid_field("Type", type_text))?;
        Ok(Self {
            name: field("Name")?.to_string(),
            value: field("Val")?.to_string(),
            item_type,
        })
    }
}

/// Removes one level of SQL single-quoting.
pub fn unquote_sql(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        s[1..s.len() - 1].replace("''", "'")
    } else {
        s.to_string()
    }
}

/// Quotes a string as an SQL literal.
pub fn quote_sql(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes() {
        for t in [ItemType::Text, ItemType::Long, ItemType::Double, ItemType::Date] {
            assert_eq!(ItemType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ItemType::parse("LONG"), Some(ItemType::Long));
        assert_eq!(ItemType::parse("blob"), None);
    }

    #[test]
    fn value_parses_per_type() {
        assert_eq!(Item::long("id", 42).value().unwrap(), ItemValue::Long(42));
        assert_eq!(
            Item::double("amount", 2.5).value().unwrap(),
            ItemValue::Double(2.5)
        );
        assert_eq!(
            Item::text("name", "'O''Brien'").value().unwrap(),
            ItemValue::Text("O'Brien".into())
        );
        assert_eq!(
            Item::date("day", "'2024-03-01'").value().unwrap(),
            ItemValue::Date("2024-03-01".into())
        );
    }

    #[test]
    fn value_rejects_bad_numbers() {
        let item = Item::new("id", "abc", ItemType::Long);
        assert!(matches!(
            item.value(),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn unquoted_leaves_numbers_alone() {
        assert_eq!(Item::new("n", "'5'", ItemType::Long).unquoted(), "'5'");
        assert_eq!(Item::text("s", "plain").unquoted(), "plain");
        assert_eq!(Item::text("s", "'").unquoted(), "'");
    }

    #[test]
    fn quoting_helpers_are_inverse() {
        let raw = "it's";
        assert_eq!(quote_sql(raw), "'it''s'");
        assert_eq!(unquote_sql(&quote_sql(raw)), raw);
    }

    #[test]
    fn element_roundtrip() {
        let item = Item::date("due", "2024-12-31");
        let decoded = Item::from_element(&item.to_element()).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn element_missing_type() {
        let el = Element::new("Item")
            .with_child(Element::leaf("Name", "a"))
            .with_child(Element::leaf("Val", "b"));
        assert!(matches!(
            Item::from_element(&el),
            Err(ProtocolError::MissingNode { .. })
        ));
    }
}
