//! Query result sets: `<Structure>` and `<Data>`.

use crate::error::{ProtocolError, ProtocolResult};
use joty_xml::Element;

/// Column description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldDesc {
    /// Column name.
    pub name: String,
    /// Display length.
    pub len: u32,
    /// Decimal digits.
    pub dec: u32,
    /// Position in the source set, when it differs from the column order.
    pub pos: Option<u32>,
}

impl FieldDesc {
    /// Creates a column description.
    pub fn new(name: impl Into<String>, len: u32, dec: u32) -> Self {
        Self {
            name: name.into(),
            len,
            dec,
            pos: None,
        }
    }

    fn to_element(&self) -> Element {
        let mut el = Element::new("Field")
            .with_attr("name", self.name.clone())
            .with_attr("len", self.len.to_string())
            .with_attr("dec", self.dec.to_string());
        if let Some(pos) = self.pos {
            el = el.with_attr("pos", pos.to_string());
        }
        el
    }

    fn from_element(el: &Element) -> ProtocolResult<Self> {
        let number = |attr: &str| -> ProtocolResult<u32> {
            let text = el.attr(attr).unwrap_or("0");
            text.trim()
                .parse()
                .map_err(|_| ProtocolError::invalid_field(attr, text))
        };
        let name = el
            .attr("name")
            .ok_or_else(|| ProtocolError::missing("Field", "name"))?;
        let pos = match el.attr("pos") {
            Some(_) => Some(number("pos")?),
            None => None,
        };
        Ok(Self {
            name: name.to_string(),
            len: number("len")?,
            dec: number("dec")?,
            pos,
        })
    }
}

/// Rows returned by a query. `None` cells are SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResultSet {
    /// Columns.
    pub fields: Vec<FieldDesc>,
    /// Rows, each as wide as `fields`.
    pub records: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    /// Creates an empty result with the given columns.
    pub fn new(fields: Vec<FieldDesc>) -> Self {
        Self {
            fields,
            records: Vec::new(),
        }
    }

    /// Appends a row, padding or truncating it to the column count.
    pub fn push_record(&mut self, mut record: Vec<Option<String>>) {
        record.resize(self.fields.len(), None);
        self.records.push(record);
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of a column (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Cell value by row and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.records.get(row)?.get(col)?.as_deref()
    }

    /// Encodes the `<Structure>` and `<Data>` elements.
    pub fn to_elements(&self) -> (Element, Element) {
        let mut structure = Element::new("Structure");
        for field in &self.fields {
            structure.push(field.to_element());
        }
        let mut data = Element::new("Data");
        for record in &self.records {
            let mut row = Element::new("Record");
            for (i, cell) in record.iter().enumerate() {
                if let Some(value) = cell {
                    row.push(Element::leaf(format!("c{i}"), value.clone()));
                }
            }
            data.push(row);
        }
        (structure, data)
    }

    /// Decodes `<Structure>` and `<Data>` elements.
    pub fn from_elements(structure: &Element, data: &Element) -> ProtocolResult<Self> {
        let fields = structure
            .children_named("Field")
            .map(FieldDesc::from_element)
            .collect::<ProtocolResult<Vec<_>>>()?;
        let mut set = Self::new(fields);
        for row in data.children_named("Record") {
            let mut record = vec![None; set.fields.len()];
            for cell in &row.children {
                let index = cell
                    .name
                    .strip_prefix('c')
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| ProtocolError::UnexpectedNode {
                        expected: "c<n>".into(),
                        found: cell.name.clone(),
                    })?;
                let slot = record
                    .get_mut(index)
                    .ok_or_else(|| ProtocolError::invalid_field("Record", cell.name.clone()))?;
                *slot = Some(cell.text.clone());
            }
            set.records.push(record);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut set = ResultSet::new(vec![
            FieldDesc::new("ID", 10, 0),
            FieldDesc {
                pos: Some(3),
                ..FieldDesc::new("NAME", 40, 0)
            },
            FieldDesc::new("PRICE", 12, 2),
        ]);
        set.push_record(vec![Some("1".into()), Some("Widget".into()), Some("9.50".into())]);
        set.push_record(vec![Some("2".into()), None, Some("".into())]);
        set
    }

    #[test]
    fn null_cells_are_omitted() {
        let (_, data) = sample().to_elements();
        let second = &data.children[1];
        let names: Vec<_> = second.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c0", "c2"]);
    }

    #[test]
    fn elements_roundtrip() {
        let set = sample();
        let (structure, data) = set.to_elements();
        let decoded = ResultSet::from_elements(&structure, &data).unwrap();
        assert_eq!(decoded, set);
        assert_eq!(decoded.value(0, "name"), Some("Widget"));
        assert_eq!(decoded.value(1, "NAME"), None);
        assert_eq!(decoded.value(1, "price"), Some(""));
    }

    #[test]
    fn push_record_pads() {
        let mut set = ResultSet::new(vec![FieldDesc::new("A", 1, 0), FieldDesc::new("B", 1, 0)]);
        set.push_record(vec![Some("x".into())]);
        assert_eq!(set.records[0], vec![Some("x".into()), None]);
    }

    #[test]
    fn cell_outside_structure_is_rejected() {
        let structure = Element::new("Structure").with_child(
            Element::new("Field")
                .with_attr("name", "A")
                .with_attr("len", "1")
                .with_attr("dec", "0"),
        );
        let data = Element::new("Data")
            .with_child(Element::new("Record").with_child(Element::leaf("c5", "boom")));
        assert!(ResultSet::from_elements(&structure, &data).is_err());
    }
}
