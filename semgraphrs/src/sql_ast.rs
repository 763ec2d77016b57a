use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::expr::{BoundExpr, BoundPart};
use crate::request::SortDirection;

#[derive(Debug, Clone)]
pub enum SqlExpr {
    Column {
        table: Option<String>,
        name: String,
    },
    Literal(Value),
    /// A model expression with its columns already bound to table aliases.
    Fragment(BoundExpr),
    BinaryOp {
        op: SqlBinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        list: Vec<SqlExpr>,
        negated: bool,
    },
    IsNull {
        expr: Box<SqlExpr>,
        negated: bool,
    },
    NullSafeEq {
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Coalesce(Vec<SqlExpr>),
    Nested(Box<SqlExpr>),
    /// Correlated `EXISTS (subquery)`.
    Exists(Box<SelectQuery>),
}

impl SqlExpr {
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        SqlExpr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn binary(op: SqlBinaryOperator, left: SqlExpr, right: SqlExpr) -> Self {
        SqlExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBinaryOperator {
    And,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: SqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TableSource {
    Table { schema: String, name: String },
    Subquery(Box<SelectQuery>),
}

impl Default for TableSource {
    fn default() -> Self {
        TableSource::Table {
            schema: String::new(),
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableRef {
    pub source: TableSource,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlJoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub join_type: SqlJoinType,
    pub table: TableRef,
    pub on: Vec<SqlExpr>,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: SqlExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub select: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    /// 1-based positions into `select`.
    pub group_by: Vec<usize>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub struct SqlRenderer<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlRenderer<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn render_select(&self, query: &SelectQuery) -> Result<String> {
        let pagination =
            self.dialect
                .render_pagination(query.limit, query.offset, !query.order_by.is_empty())?;

        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| {
                let expr_sql = self.render_expr(&item.expr)?;
                Ok(match &item.alias {
                    Some(alias) => format!("{expr_sql} AS {}", self.dialect.quote_identifier(alias)),
                    None => expr_sql,
                })
            })
            .collect::<Result<_>>()?;

        let mut sql = String::from("SELECT ");
        if let Some(top) = &pagination.top {
            sql.push_str(top);
            sql.push(' ');
        }
        sql.push_str(&format!(
            "{} FROM {}",
            select_items.join(", "),
            self.render_table_ref(&query.from)?
        ));

        for join in &query.joins {
            let join_kw = self.dialect.render_join(join.join_type)?;
            sql.push_str(&format!(" {join_kw} {}", self.render_table_ref(&join.table)?));
            if join.join_type != SqlJoinType::Cross {
                let on_clause: Vec<String> = join
                    .on
                    .iter()
                    .map(|e| self.render_expr(e))
                    .collect::<Result<_>>()?;
                let on_clause = if on_clause.is_empty() {
                    self.dialect.render_bool(true).to_string()
                } else {
                    on_clause.join(" AND ")
                };
                sql.push_str(&format!(" ON {on_clause}"));
            }
        }

        if !query.filters.is_empty() {
            let filters: Vec<String> = query
                .filters
                .iter()
                .map(|f| self.render_expr(f))
                .collect::<Result<_>>()?;
            sql.push_str(&format!(" WHERE {}", filters.join(" AND ")));
        }

        if !query.group_by.is_empty() {
            let groups: Vec<String> = if self.dialect.group_by_ordinals() {
                query.group_by.iter().map(|p| p.to_string()).collect()
            } else {
                query
                    .group_by
                    .iter()
                    .filter_map(|p| p.checked_sub(1).and_then(|i| query.select.get(i)))
                    .map(|item| self.render_expr(&item.expr))
                    .collect::<Result<_>>()?
            };
            sql.push_str(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query
                .order_by
                .iter()
                .map(|o| {
                    let expr = self.render_expr(&o.expr)?;
                    let dir = match o.direction {
                        SortDirection::Asc => "ASC",
                        SortDirection::Desc => "DESC",
                    };
                    Ok(format!("{expr} {dir}"))
                })
                .collect::<Result<_>>()?;
            sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));
        }

        if let Some(trailing) = &pagination.trailing {
            sql.push(' ');
            sql.push_str(trailing);
        }

        Ok(sql)
    }

    fn render_table_ref(&self, table: &TableRef) -> Result<String> {
        let source = match &table.source {
            TableSource::Table { schema, name } if schema.is_empty() => {
                self.dialect.quote_identifier(name)
            }
            TableSource::Table { schema, name } => format!(
                "{}.{}",
                self.dialect.quote_identifier(schema),
                self.dialect.quote_identifier(name)
            ),
            TableSource::Subquery(query) => format!("({})", self.render_select(query)?),
        };
        Ok(match &table.alias {
            Some(alias) => format!("{source} {}", self.dialect.quote_identifier(alias)),
            None => source,
        })
    }

    fn render_fragment(&self, fragment: &BoundExpr) -> String {
        fragment
            .parts
            .iter()
            .map(|part| match part {
                BoundPart::Text(text) => text.clone(),
                BoundPart::Column { table, name } => format!(
                    "{}.{}",
                    self.dialect.quote_identifier(table),
                    self.dialect.quote_identifier(name)
                ),
            })
            .collect()
    }

    pub fn render_expr(&self, expr: &SqlExpr) -> Result<String> {
        let sql = match expr {
            SqlExpr::Column { table, name } => match table {
                Some(t) => format!(
                    "{}.{}",
                    self.dialect.quote_identifier(t),
                    self.dialect.quote_identifier(name)
                ),
                None => self.dialect.quote_identifier(name),
            },
            SqlExpr::Literal(v) => self.dialect.render_literal(v),
            SqlExpr::Fragment(fragment) => self.render_fragment(fragment),
            SqlExpr::BinaryOp { op, left, right } => {
                let op_sql = match op {
                    SqlBinaryOperator::And => "AND",
                    SqlBinaryOperator::Eq => "=",
                    SqlBinaryOperator::Neq => "<>",
                    SqlBinaryOperator::Gt => ">",
                    SqlBinaryOperator::Gte => ">=",
                    SqlBinaryOperator::Lt => "<",
                    SqlBinaryOperator::Lte => "<=",
                    SqlBinaryOperator::Like => "LIKE",
                };
                format!(
                    "({} {} {})",
                    self.render_expr(left)?,
                    op_sql,
                    self.render_expr(right)?
                )
            }
            SqlExpr::InList {
                expr,
                list,
                negated,
            } => {
                let rendered_values: Vec<String> = list
                    .iter()
                    .map(|v| self.render_expr(v))
                    .collect::<Result<_>>()?;
                let not_kw = if *negated { "NOT " } else { "" };
                format!(
                    "({} {}IN ({}))",
                    self.render_expr(expr)?,
                    not_kw,
                    rendered_values.join(", ")
                )
            }
            SqlExpr::IsNull { expr, negated } => {
                let not_kw = if *negated { " NOT" } else { "" };
                format!("({} IS{not_kw} NULL)", self.render_expr(expr)?)
            }
            SqlExpr::NullSafeEq { left, right } => self
                .dialect
                .render_null_safe_eq(&self.render_expr(left)?, &self.render_expr(right)?),
            SqlExpr::Coalesce(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|i| self.render_expr(i))
                    .collect::<Result<_>>()?;
                format!("COALESCE({})", rendered.join(", "))
            }
            SqlExpr::Nested(inner) => format!("({})", self.render_expr(inner)?),
            SqlExpr::Exists(query) => format!("EXISTS ({})", self.render_select(query)?),
        };
        Ok(sql)
    }
}
