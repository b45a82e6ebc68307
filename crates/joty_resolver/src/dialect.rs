//! Database dialects and paged query composition.
//!
//! A page template carries the markers `<openStm>`, `<set>`, `<whereConj>`,
//! `<whereClause>`, `<sortField>`, `<closeStm>`, `<pageSize>` and
//! `<iteration>`. Substitution is literal string replacement: filter and
//! sort text must already be safe SQL.

use joty_protocol::NO_PAGINATION;

/// Alias given to a parenthesized set definition.
pub const SET_ALIAS: &str = "joty_set";

/// SQL dialect settings used when composing queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Name, e.g. `sqlite`.
    pub name: String,
    /// Page template.
    pub page_template: String,
    /// Text replacing `<openStm>`.
    pub open_stm: String,
    /// Text replacing `<closeStm>`.
    pub close_stm: String,
}

impl Dialect {
    /// SQLite: `LIMIT`/`OFFSET` with an expression offset.
    pub fn sqlite() -> Self {
        Self {
            name: "sqlite".into(),
            page_template: "<openStm>SELECT * FROM <set><whereConj><whereClause> ORDER BY <sortField> \
                            LIMIT <pageSize> OFFSET <iteration> * <pageSize><closeStm>"
                .into(),
            open_stm: String::new(),
            close_stm: String::new(),
        }
    }

    /// PostgreSQL.
    pub fn postgres() -> Self {
        Self {
            name: "postgres".into(),
            ..Self::sqlite()
        }
    }

    /// Looks a dialect up by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::sqlite()),
            "postgres" | "postgresql" => Some(Self::postgres()),
            _ => None,
        }
    }

    /// Composes the query for one page, or the whole set when `iteration`
    /// is [`NO_PAGINATION`].
    pub fn search_sql(
        &self,
        set_definition: &str,
        where_clause: &str,
        sort: &str,
        iteration: i32,
        page_size: u32,
    ) -> String {
        let set = set_expression(set_definition);
        let where_clause = where_clause.trim();
        let where_conj = if where_clause.is_empty() { "" } else { " WHERE " };
        let sort = if sort.trim().is_empty() { "1" } else { sort.trim() };

        if iteration == NO_PAGINATION || iteration < 0 {
            return format!("SELECT * FROM {set}{where_conj}{where_clause} ORDER BY {sort}");
        }
        self.page_template
            .replace("<openStm>", &self.open_stm)
            .replace("<closeStm>", &self.close_stm)
            .replace("<set>", &set)
            .replace("<whereConj>", where_conj)
            .replace("<whereClause>", where_clause)
            .replace("<sortField>", sort)
            .replace("<pageSize>", &page_size.to_string())
            .replace("<iteration>", &iteration.to_string())
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Self::sqlite()
    }
}

/// Returns the set definition ready for a `FROM` clause.
///
/// A bare table name is used as is; a select is parenthesized and aliased;
/// any other multi-table definition is wrapped in a select first.
pub fn set_expression(definition: &str) -> String {
    let trimmed = definition.trim();
    if is_single_word(trimmed) {
        return trimmed.to_string();
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("select ") || lower.starts_with("select\n") {
        format!("({trimmed}) {SET_ALIAS}")
    } else {
        format!("(SELECT * FROM {trimmed}) {SET_ALIAS}")
    }
}

/// Whether `text` is a single identifier-like word.
pub fn is_single_word(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '$' | '"'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_replaces_every_marker() {
        let sql = Dialect::sqlite().search_sql("orders", "status='open'", "", 2, 25);
        assert_eq!(
            sql,
            "SELECT * FROM orders WHERE status='open' ORDER BY 1 LIMIT 25 OFFSET 2 * 25"
        );
        assert!(!sql.contains('<'));
    }

    #[test]
    fn custom_template_with_wrappers() {
        let dialect = Dialect {
            name: "rownum".into(),
            page_template: "<openStm><set><whereConj><whereClause>|<sortField>|<pageSize>|<iteration><closeStm>".into(),
            open_stm: "[".into(),
            close_stm: "]".into(),
        };
        assert_eq!(dialect.search_sql("t", "", "name", 0, 10), "[t|name|10|0]");
    }

    #[test]
    fn no_pagination_is_plain_query() {
        let sql = Dialect::sqlite().search_sql("orders", "", "created", NO_PAGINATION, 25);
        assert_eq!(sql, "SELECT * FROM orders ORDER BY created");
    }

    #[test]
    fn multi_table_sets_are_aliased() {
        assert_eq!(
            set_expression("orders o JOIN customers c ON o.cid = c.id"),
            "(SELECT * FROM orders o JOIN customers c ON o.cid = c.id) joty_set"
        );
        assert_eq!(
            set_expression("select id from orders"),
            "(select id from orders) joty_set"
        );
        assert_eq!(set_expression(" main.orders "), "main.orders");
    }

    #[test]
    fn dialect_lookup() {
        assert_eq!(Dialect::by_name("SQLite"), Some(Dialect::sqlite()));
        assert_eq!(Dialect::by_name("postgresql").unwrap().name, "postgres");
        assert!(Dialect::by_name("db2").is_none());
    }
}
