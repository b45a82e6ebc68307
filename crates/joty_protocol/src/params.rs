//! Named, typed, dirty-tracked parameter store.

use crate::item::{Item, ItemType};
use std::collections::BTreeMap;

/// Value returned by [`ParamContext::get`] for an absent parameter.
pub const MISSING: &str = "-1";

/// Kind of a context parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// Integer.
    Num,
    /// String.
    Str,
    /// Date.
    Date,
    /// Floating point.
    Dbl,
}

impl ParamKind {
    /// Item type used when the parameter is sent on the wire.
    pub fn item_type(self) -> ItemType {
        match self {
            ParamKind::Num => ItemType::Long,
            ParamKind::Str => ItemType::Text,
            ParamKind::Date => ItemType::Date,
            ParamKind::Dbl => ItemType::Double,
        }
    }

    /// Kind matching an item type.
    pub fn from_item_type(item_type: ItemType) -> Self {
        match item_type {
            ItemType::Long => ParamKind::Num,
            ItemType::Text => ParamKind::Str,
            ItemType::Date => ParamKind::Date,
            ItemType::Double => ParamKind::Dbl,
        }
    }
}

/// A stored parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextParam {
    /// Name as first set (lookups ignore case).
    pub name: String,
    /// Kind.
    pub kind: ParamKind,
    /// Value rendered as text.
    pub value: String,
    /// Set since the last [`ParamContext::set_dirty`]`(false)`.
    pub dirty: bool,
}

/// Case-insensitive parameter store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamContext {
    params: BTreeMap<String, ContextParam>,
}

impl ParamContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&mut self, name: &str, kind: ParamKind, value: String) {
        let key = name.to_lowercase();
        match self.params.get_mut(&key) {
            Some(param) => {
                param.kind = kind;
                param.value = value;
                param.dirty = true;
            }
            None => {
                self.params.insert(
                    key,
                    ContextParam {
                        name: name.to_string(),
                        kind,
                        value,
                        dirty: true,
                    },
                );
            }
        }
    }

    /// Sets an integer parameter.
    pub fn set_num(&mut self, name: &str, value: i64) {
        self.set(name, ParamKind::Num, value.to_string());
    }

    /// Sets a string parameter.
    pub fn set_str(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, ParamKind::Str, value.into());
    }

    /// Sets a date parameter.
    pub fn set_date(&mut self, name: &str, value: impl Into<String>) {
        self.set(name, ParamKind::Date, value.into());
    }

    /// Sets a floating point parameter.
    pub fn set_dbl(&mut self, name: &str, value: f64) {
        self.set(name, ParamKind::Dbl, value.to_string());
    }

    /// Sets a parameter from a wire item, stripping SQL quoting.
    pub fn set_item(&mut self, item: &Item) {
        self.set(
            &item.name,
            ParamKind::from_item_type(item.item_type),
            item.unquoted(),
        );
    }

    /// Returns the value, or [`MISSING`] when absent.
    ///
    /// A stored value of `-1` cannot be told apart from absence here; use
    /// [`ParamContext::lookup`] when that matters.
    pub fn get(&self, name: &str) -> String {
        self.lookup(name)
            .map_or_else(|| MISSING.to_string(), |p| p.value.clone())
    }

    /// Returns the stored parameter, if any.
    pub fn lookup(&self, name: &str) -> Option<&ContextParam> {
        self.params.get(&name.to_lowercase())
    }

    /// Whether `get(name)` yields the missing sentinel.
    pub fn is_missing(&self, name: &str) -> bool {
        self.get(name) == MISSING
    }

    /// Removes every parameter.
    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Sets the dirty flag on every parameter.
    pub fn set_dirty(&mut self, dirty: bool) {
        for param in self.params.values_mut() {
            param.dirty = dirty;
        }
    }

    /// Merges `other` into this context; entries of `other` win.
    pub fn copy_from(&mut self, other: &ParamContext) {
        for (key, param) in &other.params {
            self.params.insert(key.clone(), param.clone());
        }
    }

    /// Number of stored parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterates stored parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ContextParam> {
        self.params.values()
    }

    /// Renders parameters as wire items: all of them, or only dirty ones.
    pub fn to_items(&self, dirty_only: bool) -> Vec<Item> {
        self.params
            .values()
            .filter(|p| !dirty_only || p.dirty)
            .map(|p| Item::new(p.name.clone(), p.value.clone(), p.kind.item_type()))
            .collect()
    }

    /// Stores every item into the context.
    pub fn bind_items(&mut self, items: &[Item]) {
        for item in items {
            self.set_item(item);
        }
    }
}
