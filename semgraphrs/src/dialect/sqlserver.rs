//! SQL Server (T-SQL) dialect implementation.
//!
//! Bracket quoting, `TOP n` for plain limits, `OFFSET … FETCH` for paging
//! (which T-SQL only accepts after an ORDER BY) and no positional GROUP BY.

use super::{unsupported, Dialect, Pagination};
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn render_bool(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn render_pagination(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        ordered: bool,
    ) -> Result<Pagination> {
        match (limit, offset) {
            (None, None) => Ok(Pagination::default()),
            (Some(limit), None) => Ok(Pagination {
                top: Some(format!("TOP {limit}")),
                trailing: None,
            }),
            (_, Some(_)) if !ordered => Err(unsupported(self, "OFFSET without ORDER BY")),
            (limit, Some(offset)) => {
                let mut trailing = format!("OFFSET {offset} ROWS");
                if let Some(limit) = limit {
                    trailing.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
                Ok(Pagination {
                    top: None,
                    trailing: Some(trailing),
                })
            }
        }
    }

    fn group_by_ordinals(&self) -> bool {
        false
    }

    fn render_null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("({left} = {right} OR ({left} IS NULL AND {right} IS NULL))")
    }
}
