//! Query plan intermediate representation.
//!
//! The plan records which query shape was chosen; rendering turns it into a
//! [`SelectQuery`] without making further decisions.

use crate::error::{Result, SemgraphError};
use crate::sql_ast::{
    Join, OrderItem, SelectItem, SelectQuery, SqlExpr, SqlJoinType, TableRef, TableSource,
};

use super::Strategy;

#[derive(Debug, Clone)]
pub(crate) enum QueryPlan {
    /// One SELECT over the joined relations.
    Flat(FlatPlan),
    /// One aggregated subquery per metric relation, combined on the dimensions.
    PreAggregated(PreAggregatedPlan),
}

#[derive(Debug, Clone)]
pub(crate) struct FlatPlan {
    pub from: TableRef,
    pub select: Vec<SelectItem>,
    pub joins: Vec<Join>,
    pub filters: Vec<SqlExpr>,
    /// 1-based positions into `select`.
    pub group_by: Vec<usize>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct AggregateSubquery {
    pub alias: String,
    pub query: FlatPlan,
}

#[derive(Debug, Clone)]
pub(crate) struct PreAggregatedPlan {
    pub subqueries: Vec<AggregateSubquery>,
    /// Dimension labels exposed by every subquery.
    pub dimensions: Vec<String>,
    /// (metric label, alias of the subquery computing it), in request order.
    pub metrics: Vec<(String, String)>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryPlan {
    pub fn strategy(&self) -> Strategy {
        match self {
            QueryPlan::Flat(_) => Strategy::Flat,
            QueryPlan::PreAggregated(_) => Strategy::PreAggregated,
        }
    }

    pub fn into_select_query(self) -> Result<SelectQuery> {
        match self {
            QueryPlan::Flat(flat) => Ok(flat.into_select_query()),
            QueryPlan::PreAggregated(plan) => plan.into_select_query(),
        }
    }
}

impl FlatPlan {
    pub fn new(from: TableRef) -> Self {
        Self {
            from,
            select: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn into_select_query(self) -> SelectQuery {
        SelectQuery {
            select: self.select,
            from: self.from,
            joins: self.joins,
            filters: self.filters,
            group_by: self.group_by,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

impl PreAggregatedPlan {
    /// Outer query: first subquery in FROM, the rest FULL JOINed on null-safe
    /// dimension equality (CROSS JOINed when there are no dimensions).
    pub fn into_select_query(self) -> Result<SelectQuery> {
        let aliases: Vec<String> = self.subqueries.iter().map(|s| s.alias.clone()).collect();
        let mut subqueries = self.subqueries.into_iter();
        let base = subqueries.next().ok_or_else(|| {
            SemgraphError::Other(anyhow::anyhow!("pre-aggregated plan without subqueries"))
        })?;

        let mut joins = Vec::new();
        for (position, sub) in subqueries.enumerate() {
            let previous = &aliases[..=position];
            let on = self
                .dimensions
                .iter()
                .map(|dim| SqlExpr::NullSafeEq {
                    left: Box::new(coalesce(previous, dim)),
                    right: Box::new(SqlExpr::column(sub.alias.clone(), dim.clone())),
                })
                .collect();
            let join_type = if self.dimensions.is_empty() {
                SqlJoinType::Cross
            } else {
                SqlJoinType::Full
            };
            joins.push(Join {
                join_type,
                table: subquery_ref(sub),
                on,
            });
        }

        let mut select: Vec<SelectItem> = self
            .metrics
            .iter()
            .map(|(label, alias)| SelectItem {
                expr: SqlExpr::column(alias.clone(), label.clone()),
                alias: Some(label.clone()),
            })
            .collect();
        select.extend(self.dimensions.iter().map(|dim| SelectItem {
            expr: coalesce(&aliases, dim),
            alias: Some(dim.clone()),
        }));

        Ok(SelectQuery {
            select,
            from: subquery_ref(base),
            joins,
            filters: Vec::new(),
            group_by: Vec::new(),
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

fn subquery_ref(sub: AggregateSubquery) -> TableRef {
    TableRef {
        source: TableSource::Subquery(Box::new(sub.query.into_select_query())),
        alias: Some(sub.alias),
    }
}

fn coalesce(aliases: &[String], column: &str) -> SqlExpr {
    match aliases {
        [single] => SqlExpr::column(single.clone(), column),
        many => SqlExpr::Coalesce(
            many.iter()
                .map(|alias| SqlExpr::column(alias.clone(), column))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableRef {
        TableRef {
            source: TableSource::Table {
                schema: String::new(),
                name: name.to_string(),
            },
            alias: Some(name.to_string()),
        }
    }

    fn sub(alias: &str) -> AggregateSubquery {
        AggregateSubquery {
            alias: alias.to_string(),
            query: FlatPlan::new(table(alias)),
        }
    }

    #[test]
    fn pre_aggregated_plan_joins_subqueries_on_dimensions() {
        let plan = PreAggregatedPlan {
            subqueries: vec![sub("orders_agg"), sub("refunds_agg"), sub("visits_agg")],
            dimensions: vec!["country".to_string()],
            metrics: vec![
                ("revenue".to_string(), "orders_agg".to_string()),
                ("refunded".to_string(), "refunds_agg".to_string()),
                ("visits".to_string(), "visits_agg".to_string()),
            ],
            order_by: Vec::new(),
            limit: None,
            offset: None,
        };
        let query = plan.into_select_query().unwrap();
        assert_eq!(query.joins.len(), 2);
        assert!(query.joins.iter().all(|j| j.join_type == SqlJoinType::Full));
        assert!(matches!(
            &query.joins[1].on[0],
            SqlExpr::NullSafeEq { left, .. } if matches!(left.as_ref(), SqlExpr::Coalesce(items) if items.len() == 2)
        ));
        assert_eq!(query.select.len(), 4);
        assert!(query.group_by.is_empty());
    }

    #[test]
    fn no_dimensions_means_cross_join() {
        let plan = PreAggregatedPlan {
            subqueries: vec![sub("orders_agg"), sub("refunds_agg")],
            dimensions: Vec::new(),
            metrics: vec![
                ("revenue".to_string(), "orders_agg".to_string()),
                ("refunded".to_string(), "refunds_agg".to_string()),
            ],
            order_by: Vec::new(),
            limit: Some(1),
            offset: None,
        };
        let query = plan.into_select_query().unwrap();
        assert_eq!(query.joins[0].join_type, SqlJoinType::Cross);
        assert!(query.joins[0].on.is_empty());
        assert_eq!(query.limit, Some(1));
    }
}
