//! The posted statement: one unit of database work plus its parameters.
//!
//! A statement travels as a `<Stmnt>` element whose children appear in a
//! fixed order. The reader walks siblings positionally and checks each tag
//! name as it goes, so a document with reordered fields is rejected with
//! [`ProtocolError::UnexpectedNode`] instead of being silently misread.

use crate::error::{ProtocolError, ProtocolResult};
use crate::item::{Item, ItemType};
use joty_xml::Element;

/// Value of `iteration` when no pagination is requested.
pub const NO_PAGINATION: i32 = -1;

/// Compensation tag of a statement.
///
/// Statements tagged `Forward(k)` run in the forward pass. When the batch
/// fails after a `Forward(k)` statement succeeded, every `Compensation(k)`
/// statement runs once in the compensation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RollbackTag {
    /// Untagged.
    #[default]
    None,
    /// Forward action with compensation id.
    Forward(u32),
    /// Compensating action for the forward action with the same id.
    Compensation(u32),
}

impl RollbackTag {
    /// Decodes the signed wire form (`0` none, `k` forward, `-k` compensation).
    ///
    /// Ids beyond `u32` are rejected rather than folded onto another pair.
    pub fn from_wire(value: i64) -> ProtocolResult<Self> {
        let id = u32::try_from(value.unsigned_abs())
            .map_err(|_| ProtocolError::invalid_field("NMRA", value.to_string()))?;
        Ok(match value.signum() {
            0 => RollbackTag::None,
            1 => RollbackTag::Forward(id),
            _ => RollbackTag::Compensation(id),
        })
    }

    /// Encodes to the signed wire form.
    pub fn to_wire(self) -> i64 {
        match self {
            RollbackTag::None => 0,
            RollbackTag::Forward(k) => i64::from(k),
            RollbackTag::Compensation(k) => -i64::from(k),
        }
    }

    /// Whether the statement takes part in the forward pass.
    pub fn runs_forward(self) -> bool {
        !matches!(self, RollbackTag::Compensation(_))
    }
}

/// Out-parameter declaration for a method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OutParams {
    /// 1-based position in the batch's returned values where this call
    /// starts writing. `None` skips the position check.
    pub first_pos: Option<u32>,
    /// Number of out-parameters the method fills.
    pub count: u32,
    /// Whether the method's own return value is appended after the outs.
    pub method_return_expected: bool,
}

impl OutParams {
    /// Creates a declaration with `count` outs starting at `first_pos`.
    pub fn new(first_pos: u32, count: u32) -> Self {
        Self {
            first_pos: Some(first_pos),
            count,
            method_return_expected: false,
        }
    }

    /// Marks the method's return value as expected.
    pub fn with_return(mut self) -> Self {
        self.method_return_expected = true;
        self
    }

    /// Number of values this call appends to the returned-values list.
    pub fn produced(&self) -> usize {
        self.count as usize + usize::from(self.method_return_expected)
    }

    /// Encodes `(FOPP, OPQ)`. A negative OPQ means the return value is
    /// expected and carries `-(count + 1)`.
    pub fn to_wire(&self) -> (i64, i64) {
        let fopp = self.first_pos.map_or(0, i64::from);
        let count = i64::from(self.count);
        let opq = if self.method_return_expected {
            -(count + 1)
        } else {
            count
        };
        (fopp, opq)
    }

    /// Decodes `(FOPP, OPQ)`; both zero means no declaration.
    pub fn from_wire(fopp: i64, opq: i64) -> ProtocolResult<Option<Self>> {
        if fopp < 0 {
            return Err(ProtocolError::invalid_field("FOPP", fopp.to_string()));
        }
        if fopp == 0 && opq == 0 {
            return Ok(None);
        }
        let (count, method_return_expected) = if opq < 0 {
            (-(opq + 1), true)
        } else {
            (opq, false)
        };
        let count =
            u32::try_from(count).map_err(|_| ProtocolError::invalid_field("OPQ", opq.to_string()))?;
        let first_pos = if fopp == 0 {
            None
        } else {
            Some(
                u32::try_from(fopp)
                    .map_err(|_| ProtocolError::invalid_field("FOPP", fopp.to_string()))?,
            )
        };
        Ok(Some(Self {
            first_pos,
            count,
            method_return_expected,
        }))
    }
}

/// A posted statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostStatement {
    /// SQL text, a statement name, or empty when resolved by coordinates.
    pub sql: String,
    /// Field whose generated value must be returned.
    pub auto_id_field: String,
    /// Table whose generator produces the id, when not returned by the insert.
    pub gen_table: String,
    /// Expression handed to the server-side validator.
    pub verify_expr: String,
    /// Name of a registered method to invoke instead of SQL.
    pub method: String,
    /// Out-parameter declaration of the method call.
    pub out_params: Option<OutParams>,
    /// Dialog name used by the resolver.
    pub access_context: String,
    /// Panel index inside the dialog.
    pub panel_index: i32,
    /// Term or statement name inside the panel.
    pub term_name: String,
    /// Filter appended to a composed query.
    pub main_filter: String,
    /// Sort expression of a composed query.
    pub sort_expr: String,
    /// Page number, or [`NO_PAGINATION`].
    pub iteration: i32,
    /// Compensation tag.
    pub rollback: RollbackTag,
    /// Parameters.
    pub items: Vec<Item>,
    /// Client-side storage for values returned by a method call.
    pub out_values: Vec<String>,
}

impl Default for PostStatement {
    fn default() -> Self {
        Self {
            sql: String::new(),
            auto_id_field: String::new(),
            gen_table: String::new(),
            verify_expr: String::new(),
            method: String::new(),
            out_params: None,
            access_context: String::new(),
            panel_index: 0,
            term_name: String::new(),
            main_filter: String::new(),
            sort_expr: String::new(),
            iteration: NO_PAGINATION,
            rollback: RollbackTag::None,
            items: Vec::new(),
            out_values: Vec::new(),
        }
    }
}

impl PostStatement {
    /// Creates an empty statement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a statement for the given SQL text.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Sets the auto-id field.
    pub fn with_auto_id(mut self, field: impl Into<String>) -> Self {
        self.auto_id_field = field.into();
        self
    }

    /// Sets the generator table.
    pub fn with_gen_table(mut self, table: impl Into<String>) -> Self {
        self.gen_table = table.into();
        self
    }

    /// Sets the validator expression.
    pub fn with_verify(mut self, expr: impl Into<String>) -> Self {
        self.verify_expr = expr.into();
        self
    }

    /// Sets the resolver coordinates.
    pub fn with_coordinates(
        mut self,
        access_context: impl Into<String>,
        panel_index: i32,
        term_name: impl Into<String>,
    ) -> Self {
        self.access_context = access_context.into();
        self.panel_index = panel_index;
        self.term_name = term_name.into();
        self
    }

    /// Sets the compensation tag.
    pub fn with_rollback(mut self, tag: RollbackTag) -> Self {
        self.rollback = tag;
        self
    }

    /// Sets filter, sort and page for a composed query.
    pub fn with_paging(
        mut self,
        main_filter: impl Into<String>,
        sort_expr: impl Into<String>,
        iteration: i32,
    ) -> Self {
        self.main_filter = main_filter.into();
        self.sort_expr = sort_expr.into();
        self.iteration = iteration;
        self
    }

    /// Appends an item.
    pub fn add_item(&mut self, name: impl Into<String>, value: impl Into<String>, item_type: ItemType) {
        self.items.push(Item::new(name, value, item_type));
    }

    /// Appends an item, builder style.
    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Declares a method invocation.
    ///
    /// Out-value storage is allocated only when `out` carries a position.
    pub fn set_method(&mut self, name: impl Into<String>, out: Option<OutParams>) {
        self.method = name.into();
        self.out_params = out;
        self.out_values.clear();
        if let Some(out) = out.filter(|o| o.first_pos.is_some()) {
            self.out_values = vec![String::new(); out.produced()];
        }
    }

    /// Whether this statement invokes a method.
    pub fn is_method_call(&self) -> bool {
        !self.method.is_empty()
    }

    /// Whether the resolver coordinates are set.
    pub fn has_coordinates(&self) -> bool {
        !self.access_context.is_empty()
    }

    /// Resets every field and drops items and out-values.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Encodes as a `<Stmnt>` element (or any other name, for `<QueryDef>`).
    pub fn to_element_named(&self, name: &str) -> Element {
        let (fopp, opq) = self.out_params.map_or((0, 0), |o| o.to_wire());
        let mut el = Element::new(name)
            .with_child(Element::leaf("SqlStmnt", self.sql.clone()))
            .with_child(Element::leaf("AutoId", self.auto_id_field.clone()))
            .with_child(Element::leaf("GenTable", self.gen_table.clone()))
            .with_child(Element::leaf("VerifyExpr", self.verify_expr.clone()))
            .with_child(Element::leaf("Method", self.method.clone()))
            .with_child(Element::leaf("FOPP", fopp.to_string()))
            .with_child(Element::leaf("OPQ", opq.to_string()))
            .with_child(Element::leaf("AccessContext", self.access_context.clone()))
            .with_child(Element::leaf("PanelIdx", self.panel_index.to_string()))
            .with_child(Element::leaf("TermName", self.term_name.clone()))
            .with_child(Element::leaf("MainFilter", self.main_filter.clone()))
            .with_child(Element::leaf("SortExpr", self.sort_expr.clone()))
            .with_child(Element::leaf("Iteration", self.iteration.to_string()));
        if self.rollback != RollbackTag::None {
            el.push(Element::leaf("NMRA", self.rollback.to_wire().to_string()));
        }
        let mut items = Element::new("Items");
        for item in &self.items {
            items.push(item.to_element());
        }
        el.push(items);
        el
    }

    /// Encodes as a `<Stmnt>` element.
    pub fn to_element(&self) -> Element {
        self.to_element_named("Stmnt")
    }

    /// Decodes a `<Stmnt>`-shaped element.
    pub fn from_element(element: &Element) -> ProtocolResult<Self> {
        let mut fields = FieldCursor::new(element);
        let sql = fields.text("SqlStmnt")?;
        let auto_id_field = fields.text("AutoId")?;
        let gen_table = fields.text("GenTable")?;
        let verify_expr = fields.text("VerifyExpr")?;
        let method = fields.text("Method")?;
        let fopp = fields.number("FOPP")?;
        let opq = fields.number("OPQ")?;
        let access_context = fields.text("AccessContext")?;
        let panel_index = fields.number("PanelIdx")?;
        let term_name = fields.text("TermName")?;
        let main_filter = fields.text("MainFilter")?;
        let sort_expr = fields.text("SortExpr")?;
        let iteration = fields.number("Iteration")?;
        let rollback = match fields.optional("NMRA") {
            Some(el) => RollbackTag::from_wire(parse_number("NMRA", el.text())?)?,
            None => RollbackTag::None,
        };
        let items = fields
            .element("Items")?
            .children
            .iter()
            .map(|child| {
                if child.name == "Item" {
                    Item::from_element(child)
                } else {
                    Err(ProtocolError::UnexpectedNode {
                        expected: "Item".into(),
                        found: child.name.clone(),
                    })
                }
            })
            .collect::<ProtocolResult<Vec<_>>>()?;
        fields.finish()?;

        let out_params = OutParams::from_wire(fopp, opq)?;
        Ok(Self {
            sql,
            auto_id_field,
            gen_table,
            verify_expr,
            method,
            out_params,
            access_context,
            panel_index: narrow("PanelIdx", panel_index)?,
            term_name,
            main_filter,
            sort_expr,
            iteration: narrow("Iteration", iteration)?,
            rollback,
            items,
            out_values: Vec::new(),
        })
    }
}

fn parse_number(field: &str, text: &str) -> ProtocolResult<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| ProtocolError::invalid_field(field, text))
}

fn narrow(field: &str, value: i64) -> ProtocolResult<i32> {
    i32::try_from(value).map_err(|_| ProtocolError::invalid_field(field, value.to_string()))
}

/// Positional reader over the children of an element.
struct FieldCursor<'a> {
    parent: &'a Element,
    index: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(parent: &'a Element) -> Self {
        Self { parent, index: 0 }
    }

    fn element(&mut self, name: &str) -> ProtocolResult<&'a Element> {
        let child = self
            .parent
            .children
            .get(self.index)
            .ok_or_else(|| ProtocolError::missing(self.parent.name.clone(), name))?;
        if child.name != name {
            return Err(ProtocolError::UnexpectedNode {
                expected: name.to_string(),
                found: child.name.clone(),
            });
        }
        self.index += 1;
        Ok(child)
    }

    fn optional(&mut self, name: &str) -> Option<&'a Element> {
        let child = self.parent.children.get(self.index)?;
        if child.name == name {
            self.index += 1;
            Some(child)
        } else {
            None
        }
    }

    fn text(&mut self, name: &str) -> ProtocolResult<String> {
        Ok(self.element(name)?.text.clone())
    }

    fn number(&mut self, name: &str) -> ProtocolResult<i64> {
        let el = self.element(name)?;
        parse_number(name, &el.text)
    }

    fn finish(self) -> ProtocolResult<()> {
        match self.parent.children.get(self.index) {
            Some(extra) => Err(ProtocolError::UnexpectedNode {
                expected: format!("end of <{}>", self.parent.name),
                found: extra.name.clone(),
            }),
            None => Ok(()),
        }
    }
}
