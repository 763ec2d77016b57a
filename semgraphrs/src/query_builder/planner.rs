//! Query planner orchestration.
//!
//! Decides between a flat joined SELECT and the pre-aggregate-then-join shape.
//! Metrics from more than one relation combined over any join that is not
//! one-to-one would be multiplied by a flat join, so each metric relation is
//! aggregated on its own first.
//!
//! Inside any aggregating SELECT the metric relation is the root, and no
//! relation reached through a one-to-many step is joined as raw rows: filters
//! on those relations become a correlated `EXISTS`, and grouping by their
//! columns is rejected.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Result, SemgraphError};
use crate::expr::{BoundExpr, Expression};
use crate::join_graph::{JoinPlan, JoinStep, PathMode};
use crate::model::{JoinTerm, Relation};
use crate::registry::SemanticModel;
use crate::request::QueryRequest;
use crate::sql_ast::{Join, OrderItem, SelectItem, SqlExpr, SqlJoinType, TableRef, TableSource};

use super::filters::render_filter_expr;
use super::plan::{AggregateSubquery, FlatPlan, PreAggregatedPlan, QueryPlan};
use super::resolve::{Aliases, ResolvedField, ResolvedFilter, ResolvedRequest};

/// One projected column of a SELECT.
enum Projection<'a, 'm> {
    Metric(&'a ResolvedField<'m>),
    Dimension(&'a ResolvedField<'m>),
}

impl<'m> Projection<'_, 'm> {
    fn field(&self) -> &ResolvedField<'m> {
        match self {
            Projection::Metric(f) | Projection::Dimension(f) => f,
        }
    }
}

pub(crate) fn build_plan(
    model: &SemanticModel,
    resolved: &ResolvedRequest<'_, '_>,
    request: &QueryRequest,
    limit: Option<u64>,
    mode: PathMode,
) -> Result<QueryPlan> {
    let required = resolved.required_relations();
    let metric_relations = resolved.metric_relations();
    let join_plan = model.resolve_join_plan(&required, mode)?;

    let order_by: Vec<OrderItem> = request
        .order
        .iter()
        .map(|item| OrderItem {
            expr: SqlExpr::Column {
                table: None,
                name: item.field.clone(),
            },
            direction: item.direction,
        })
        .collect();

    let plan = if metric_relations.len() > 1 && !join_plan.all_one_to_one() {
        tracing::debug!(
            metric_relations = metric_relations.len(),
            relations = ?join_plan.relations(),
            "fan-out risk, pre-aggregating per metric relation"
        );
        build_pre_aggregated_plan(
            model,
            resolved,
            &metric_relations,
            mode,
            order_by,
            limit,
            request.offset,
        )?
    } else {
        let projections: Vec<Projection> = resolved
            .metrics
            .iter()
            .map(Projection::Metric)
            .chain(resolved.dimensions.iter().map(Projection::Dimension))
            .collect();
        let mut flat = build_select(model, &join_plan, &projections, &resolved.filters)?;
        flat.order_by = order_by;
        flat.limit = limit;
        flat.offset = request.offset;
        tracing::debug!(relations = ?join_plan.relations(), "flat plan");
        QueryPlan::Flat(flat)
    };
    Ok(plan)
}

fn build_pre_aggregated_plan(
    model: &SemanticModel,
    resolved: &ResolvedRequest<'_, '_>,
    metric_relations: &[&Relation],
    mode: PathMode,
    order_by: Vec<OrderItem>,
    limit: Option<u64>,
    offset: Option<u64>,
) -> Result<QueryPlan> {
    let mut subquery_aliases = Aliases::default();
    let mut subqueries = Vec::with_capacity(metric_relations.len());

    for relation in metric_relations {
        let alias =
            subquery_aliases.assign(&relation.key, &format!("{}_agg", relation.reference));

        let mut required = vec![relation.key.as_str()];
        required.extend(resolved.dimensions.iter().map(|d| d.relation.key.as_str()));
        required.extend(resolved.filters.iter().map(|f| f.field.relation.key.as_str()));
        let slice = model.resolve_join_plan(&required, mode)?;

        let projections: Vec<Projection> = resolved
            .dimensions
            .iter()
            .map(Projection::Dimension)
            .chain(
                resolved
                    .metrics
                    .iter()
                    .filter(|m| m.relation.key == relation.key)
                    .map(Projection::Metric),
            )
            .collect();
        let query = build_select(model, &slice, &projections, &resolved.filters)?;
        subqueries.push(AggregateSubquery { alias, query });
    }

    let metrics = resolved
        .metrics
        .iter()
        .filter_map(|metric| {
            subquery_aliases
                .get(&metric.relation.key)
                .map(|alias| (metric.key.to_string(), alias.to_string()))
        })
        .collect();

    Ok(QueryPlan::PreAggregated(PreAggregatedPlan {
        subqueries,
        dimensions: resolved.dimensions.iter().map(|d| d.key.to_string()).collect(),
        metrics,
        order_by,
        limit,
        offset,
    }))
}

/// SELECT over one join plan: projections in order, dimensions grouped.
fn build_select(
    model: &SemanticModel,
    join_plan: &JoinPlan<'_>,
    projections: &[Projection<'_, '_>],
    filters: &[ResolvedFilter<'_, '_>],
) -> Result<FlatPlan> {
    let mut aliases = Aliases::default();
    let root = model.relation(&join_plan.root)?;
    let mut flat = FlatPlan::new(table_ref(root, aliases.alias(root)));

    let aggregates = projections
        .iter()
        .any(|p| matches!(p, Projection::Metric(_)));
    let branches = if aggregates {
        join_plan.fanout_branches()
    } else {
        HashMap::new()
    };
    for projection in projections {
        if let Projection::Dimension(dim) = projection {
            if branches.contains_key(dim.relation.key.as_str()) {
                return Err(SemgraphError::InvalidRequest(format!(
                    "dimension {} is on {}, which has many rows per {} row; \
                     metrics on {} cannot be grouped by it",
                    dim.key, dim.relation.key, join_plan.root, join_plan.root
                )));
            }
        }
    }

    for step in &join_plan.steps {
        if !branches.contains_key(step.to_relation.as_str()) {
            flat.joins.push(join_for(model, step, &mut aliases)?);
        }
    }

    for (position, projection) in projections.iter().enumerate() {
        let field = projection.field();
        flat.select.push(SelectItem {
            expr: bound(field, &mut aliases),
            alias: Some(field.key.to_string()),
        });
        if let Projection::Dimension(_) = projection {
            flat.group_by.push(position + 1);
        }
    }

    for f in filters {
        if !branches.contains_key(f.field.relation.key.as_str()) {
            let expr = bound(&f.field, &mut aliases);
            flat.filters.push(render_filter_expr(expr, f.filter));
        }
    }

    for (head, step) in join_plan.steps.iter().enumerate() {
        if branches.get(step.to_relation.as_str()) != Some(&head) {
            continue;
        }
        let branch_filters: Vec<&ResolvedFilter<'_, '_>> = filters
            .iter()
            .filter(|f| branches.get(f.field.relation.key.as_str()) == Some(&head))
            .collect();
        if branch_filters.is_empty() {
            continue;
        }
        tracing::debug!(
            from = %step.from_relation,
            to = %step.to_relation,
            filters = branch_filters.len(),
            "filtering across fan-out with EXISTS"
        );
        let exists = semi_join(
            model,
            join_plan,
            &branches,
            head,
            step,
            &branch_filters,
            &mut aliases,
        )?;
        flat.filters.push(exists);
    }

    Ok(flat)
}

/// `EXISTS` over the branch starting at fan-out step `head`, correlated to
/// the outer query through that step's join criteria.
fn semi_join(
    model: &SemanticModel,
    join_plan: &JoinPlan<'_>,
    branches: &HashMap<&str, usize>,
    head: usize,
    step: &JoinStep<'_>,
    filters: &[&ResolvedFilter<'_, '_>],
    aliases: &mut Aliases,
) -> Result<SqlExpr> {
    let (target, correlation) = join_criteria(model, step, aliases)?;
    let mut inner = FlatPlan::new(table_ref(target, aliases.alias(target)));
    inner.select.push(SelectItem {
        expr: SqlExpr::Literal(Value::from(1)),
        alias: None,
    });

    for (index, nested) in join_plan.steps.iter().enumerate() {
        if index != head && branches.get(nested.to_relation.as_str()) == Some(&head) {
            inner.joins.push(join_for(model, nested, aliases)?);
        }
    }

    inner
        .filters
        .push(SqlExpr::Nested(Box::new(SqlExpr::Fragment(correlation))));
    for f in filters {
        let expr = bound(&f.field, aliases);
        inner.filters.push(render_filter_expr(expr, f.filter));
    }
    Ok(SqlExpr::Exists(Box::new(inner.into_select_query())))
}

fn join_for(model: &SemanticModel, step: &JoinStep<'_>, aliases: &mut Aliases) -> Result<Join> {
    let (target, criteria) = join_criteria(model, step, aliases)?;
    Ok(Join {
        join_type: join_type(step.join_term()),
        table: table_ref(target, aliases.alias(target)),
        on: vec![SqlExpr::Fragment(criteria)],
    })
}

/// The step's target relation and its join criteria bound to both sides' aliases.
fn join_criteria<'m>(
    model: &'m SemanticModel,
    step: &JoinStep<'_>,
    aliases: &mut Aliases,
) -> Result<(&'m Relation, BoundExpr)> {
    let left = model.relation(&step.join.left_relation_key)?;
    let right = model.relation(&step.join.right_relation_key)?;
    let (left_alias, right_alias) = (aliases.alias(left), aliases.alias(right));
    let criteria = Expression::parse(&step.join.criteria)?
        .bind(&[(left, left_alias.as_str()), (right, right_alias.as_str())]);
    Ok((model.relation(&step.to_relation)?, criteria))
}

fn bound(field: &ResolvedField<'_>, aliases: &mut Aliases) -> SqlExpr {
    let alias = aliases.alias(field.relation);
    SqlExpr::Fragment(field.expression.bind(&[(field.relation, alias.as_str())]))
}

fn table_ref(relation: &Relation, alias: String) -> TableRef {
    TableRef {
        source: TableSource::Table {
            schema: relation.schema.clone(),
            name: relation.reference.clone(),
        },
        alias: Some(alias),
    }
}

fn join_type(term: JoinTerm) -> SqlJoinType {
    match term {
        JoinTerm::Inner => SqlJoinType::Inner,
        JoinTerm::Left => SqlJoinType::Left,
        JoinTerm::Right => SqlJoinType::Right,
        JoinTerm::Full => SqlJoinType::Full,
    }
}
