//! SQL dialect abstractions for different database backends.
//!
//! Each dialect lives in its own file. The renderer never formats a
//! dialect-specific construct itself; it asks the dialect.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Result, SemgraphError};
use crate::sql_ast::SqlJoinType;

mod bigquery;
mod duckdb;
mod mysql;
mod postgres;
mod sqlserver;

pub use bigquery::BigQueryDialect;
pub use duckdb::DuckDbDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlserver::SqlServerDialect;

/// Row limiting fragments. `top` goes right after `SELECT`, `trailing` at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    pub top: Option<String>,
    pub trailing: Option<String>,
}

/// Dialects render identifiers and primitive fragments.
/// Query structure lives in the renderer; the dialect only maps
/// logical constructs to SQL text.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, ident: &str) -> String;

    fn render_bool(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn render_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => self.render_bool(*b).to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => self.render_string(s),
            Value::Array(items) => {
                let rendered: Vec<String> = items.iter().map(|v| self.render_literal(v)).collect();
                rendered.join(", ")
            }
            Value::Object(_) => self.render_string(&value.to_string()),
        }
    }

    fn render_join(&self, join_type: SqlJoinType) -> Result<&'static str> {
        Ok(match join_type {
            SqlJoinType::Inner => "JOIN",
            SqlJoinType::Left => "LEFT JOIN",
            SqlJoinType::Right => "RIGHT JOIN",
            SqlJoinType::Full => "FULL JOIN",
            SqlJoinType::Cross => "CROSS JOIN",
        })
    }

    fn render_pagination(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        _ordered: bool,
    ) -> Result<Pagination> {
        Ok(Pagination {
            top: None,
            trailing: limit_offset(limit, offset),
        })
    }

    /// Whether `GROUP BY 1, 2` may stand in for the grouped expressions.
    fn group_by_ordinals(&self) -> bool {
        true
    }

    fn render_null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("{left} IS NOT DISTINCT FROM {right}")
    }
}

pub(crate) fn limit_offset(limit: Option<u64>, offset: Option<u64>) -> Option<String> {
    match (limit, offset) {
        (None, None) => None,
        (Some(l), None) => Some(format!("LIMIT {l}")),
        (None, Some(o)) => Some(format!("OFFSET {o}")),
        (Some(l), Some(o)) => Some(format!("LIMIT {l} OFFSET {o}")),
    }
}

pub(crate) fn unsupported(dialect: &dyn Dialect, construct: impl Into<String>) -> SemgraphError {
    SemgraphError::UnsupportedDialectConstruct {
        dialect: dialect.name(),
        construct: construct.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    DuckDb,
    Postgres,
    BigQuery,
    MySql,
    SqlServer,
}

impl DialectKind {
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::DuckDb => &DuckDbDialect,
            DialectKind::Postgres => &PostgresDialect,
            DialectKind::BigQuery => &BigQueryDialect,
            DialectKind::MySql => &MySqlDialect,
            DialectKind::SqlServer => &SqlServerDialect,
        }
    }
}

impl FromStr for DialectKind {
    type Err = SemgraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "duckdb" => Ok(DialectKind::DuckDb),
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "bigquery" => Ok(DialectKind::BigQuery),
            "mysql" => Ok(DialectKind::MySql),
            "sqlserver" | "mssql" | "tsql" => Ok(DialectKind::SqlServer),
            _ => Err(SemgraphError::UnknownDialect(s.to_string())),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dialect().name())
    }
}

/// Look a dialect up by name.
pub fn dialect_for(name: &str) -> Result<&'static dyn Dialect> {
    Ok(name.parse::<DialectKind>()?.dialect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!(dialect_for("PostgreSQL").unwrap().name(), "postgres");
        assert_eq!(dialect_for("mssql").unwrap().name(), "sqlserver");
        assert!(matches!(
            dialect_for("oracle"),
            Err(SemgraphError::UnknownDialect(name)) if name == "oracle"
        ));
    }

    #[test]
    fn identifiers_are_quoted_per_dialect() {
        assert_eq!(DuckDbDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(MySqlDialect.quote_identifier("order"), "`order`");
        assert_eq!(SqlServerDialect.quote_identifier("a]b"), "[a]]b]");
        assert_eq!(BigQueryDialect.quote_identifier("x"), "`x`");
    }

    #[test]
    fn literals_follow_dialect_rules() {
        assert_eq!(PostgresDialect.render_literal(&json!("it's")), "'it''s'");
        assert_eq!(BigQueryDialect.render_literal(&json!("it's")), "'it\\'s'");
        assert_eq!(SqlServerDialect.render_literal(&json!(true)), "1");
        assert_eq!(DuckDbDialect.render_literal(&json!(false)), "FALSE");
        assert_eq!(DuckDbDialect.render_literal(&json!(1.5)), "1.5");
    }

    fn trailing(
        dialect: &dyn Dialect,
        limit: Option<u64>,
        offset: Option<u64>,
        ordered: bool,
    ) -> Result<(Option<String>, Option<String>)> {
        dialect
            .render_pagination(limit, offset, ordered)
            .map(|p| (p.top, p.trailing))
    }

    #[test]
    fn pagination_variants() {
        assert_eq!(
            trailing(&PostgresDialect, Some(10), Some(5), false).unwrap(),
            (None, Some("LIMIT 10 OFFSET 5".to_string()))
        );
        assert_eq!(
            trailing(&SqlServerDialect, Some(10), None, false).unwrap(),
            (Some("TOP 10".to_string()), None)
        );
        assert_eq!(
            trailing(&SqlServerDialect, Some(10), Some(20), true).unwrap(),
            (
                None,
                Some("OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY".to_string())
            )
        );
        assert!(trailing(&SqlServerDialect, None, Some(20), false).is_err());
        assert!(trailing(&BigQueryDialect, None, Some(20), false).is_err());
        assert_eq!(
            trailing(&MySqlDialect, None, Some(3), false).unwrap(),
            (None, Some("LIMIT 18446744073709551615 OFFSET 3".to_string()))
        );
    }

    #[test]
    fn mysql_has_no_full_join() {
        assert!(MySqlDialect.render_join(SqlJoinType::Full).is_err());
        assert_eq!(MySqlDialect.render_join(SqlJoinType::Left).unwrap(), "LEFT JOIN");
        assert_eq!(MySqlDialect.render_null_safe_eq("a", "b"), "a <=> b");
    }
}
