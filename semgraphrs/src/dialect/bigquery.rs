//! BigQuery dialect implementation.

use super::{limit_offset, unsupported, Dialect, Pagination};
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        // BigQuery uses backticks for identifiers
        format!("`{}`", ident.replace('`', "\\`"))
    }

    fn render_string(&self, value: &str) -> String {
        // Standard SQL string literals escape with backslashes
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    fn render_pagination(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        _ordered: bool,
    ) -> Result<Pagination> {
        if limit.is_none() && offset.is_some() {
            return Err(unsupported(self, "OFFSET without LIMIT"));
        }
        Ok(Pagination {
            top: None,
            trailing: limit_offset(limit, offset),
        })
    }
}
