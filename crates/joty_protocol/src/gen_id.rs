//! Generated-id placeholder tokens.
//!
//! A statement can reference an id generated by an earlier statement of the
//! same batch with the token `'<GenIDn>'` (1-based). The server replaces the
//! token, quotes included, with the generated value before executing.

use crate::error::{ProtocolError, ProtocolResult};
use crate::item::quote_sql;

const TOKEN_OPEN: &str = "'<GenID";
const TOKEN_CLOSE: &str = ">'";

/// Renders the placeholder for the `index`-th generated id.
pub fn gen_token(index: usize) -> String {
    format!("{TOKEN_OPEN}{index}{TOKEN_CLOSE}")
}

/// Replaces every placeholder with the referenced generated value.
///
/// Numeric values are inserted bare; any other value stays an SQL literal.
pub fn substitute_gen_ids(sql: &str, generated: &[String]) -> ProtocolResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find(TOKEN_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + TOKEN_OPEN.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || !after[digits..].starts_with(TOKEN_CLOSE) {
            out.push_str(TOKEN_OPEN);
            rest = after;
            continue;
        }
        let index: usize = after[..digits].parse().map_err(|_| {
            ProtocolError::invalid_field("GenID", &after[..digits])
        })?;
        let value = index
            .checked_sub(1)
            .and_then(|i| generated.get(i))
            .ok_or(ProtocolError::GenIdOutOfRange {
                index,
                available: generated.len(),
            })?;
        if value.parse::<i64>().is_ok() {
            out.push_str(value);
        } else {
            out.push_str(&quote_sql(value));
        }
        rest = &after[digits + TOKEN_CLOSE.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape() {
        assert_eq!(gen_token(1), "'<GenID1>'");
    }

    #[test]
    fn numeric_ids_are_inserted_bare() {
        let sql = "INSERT INTO t2(tid) VALUES('<GenID1>')";
        let out = substitute_gen_ids(sql, &["7".to_string()]).unwrap();
        assert_eq!(out, "INSERT INTO t2(tid) VALUES(7)");
    }

    #[test]
    fn several_tokens() {
        let sql = "x('<GenID2>', '<GenID1>', '<GenID2>')";
        let out = substitute_gen_ids(sql, &["10".into(), "20".into()]).unwrap();
        assert_eq!(out, "x(20, 10, 20)");
    }

    #[test]
    fn text_ids_stay_quoted() {
        let out = substitute_gen_ids("v('<GenID1>')", &["a'b".into()]).unwrap();
        assert_eq!(out, "v('a''b')");
    }

    #[test]
    fn unknown_index_is_an_error() {
        let err = substitute_gen_ids("v('<GenID3>')", &["1".into()]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::GenIdOutOfRange {
                index: 3,
                available: 1
            }
        );
        assert!(substitute_gen_ids("v('<GenID0>')", &["1".into()]).is_err());
    }

    #[test]
    fn lookalikes_pass_through() {
        let sql = "select '<GenIDx>' , '<GenID1' from t";
        assert_eq!(substitute_gen_ids(sql, &[]).unwrap(), sql);
    }
}
