//! MySQL dialect implementation.
//!
//! Backtick quoting, numeric booleans, `<=>` for null-safe equality and
//! no FULL OUTER JOIN.

use super::{limit_offset, unsupported, Dialect, Pagination};
use crate::error::Result;
use crate::sql_ast::SqlJoinType;

#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn render_bool(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn render_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn render_join(&self, join_type: SqlJoinType) -> Result<&'static str> {
        match join_type {
            SqlJoinType::Inner => Ok("JOIN"),
            SqlJoinType::Left => Ok("LEFT JOIN"),
            SqlJoinType::Right => Ok("RIGHT JOIN"),
            SqlJoinType::Cross => Ok("CROSS JOIN"),
            SqlJoinType::Full => Err(unsupported(self, "FULL OUTER JOIN")),
        }
    }

    fn render_pagination(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        _ordered: bool,
    ) -> Result<Pagination> {
        // OFFSET is only valid after LIMIT; the documented workaround is the max row count
        let limit = match (limit, offset) {
            (None, Some(_)) => Some(u64::MAX),
            (limit, _) => limit,
        };
        Ok(Pagination {
            top: None,
            trailing: limit_offset(limit, offset),
        })
    }

    fn render_null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("{left} <=> {right}")
    }
}
