//! Structural validation run once when a semantic model is constructed.
//!
//! The first failing check aborts construction with a
//! [`SemgraphError::ModelIntegrity`] naming the offending key.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SemgraphError};
use crate::expr::Expression;
use crate::model::{Dimension, Join, Metric, Relation};

pub fn validate_definitions(
    relations: &[Relation],
    joins: &[Join],
    metrics: &[Metric],
    dimensions: &[Dimension],
) -> Result<()> {
    let relation_by_key = validate_relations(relations)?;
    validate_joins(joins, &relation_by_key)?;

    check_unique_keys("metric", metrics.iter().map(|m| m.key.as_str()))?;
    for metric in metrics {
        validate_bound_expression(
            "metric",
            &metric.key,
            &metric.expression,
            &metric.relation_key,
            &relation_by_key,
        )?;
    }

    check_unique_keys("dimension", dimensions.iter().map(|d| d.key.as_str()))?;
    for dimension in dimensions {
        validate_bound_expression(
            "dimension",
            &dimension.key,
            &dimension.expression,
            &dimension.relation_key,
            &relation_by_key,
        )?;
    }

    Ok(())
}

fn check(condition: bool, key: &str, reason: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(SemgraphError::integrity(key, reason()))
    }
}

fn check_unique_keys<'a>(kind: &str, keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for key in keys {
        check(!key.trim().is_empty(), key, || format!("{kind} key must not be empty"))?;
        check(seen.insert(key), key, || format!("duplicate {kind} key"))?;
    }
    Ok(())
}

fn validate_relations(relations: &[Relation]) -> Result<HashMap<&str, &Relation>> {
    check_unique_keys("relation", relations.iter().map(|r| r.key.as_str()))?;
    let mut by_key = HashMap::new();
    for relation in relations {
        check(!relation.reference.trim().is_empty(), &relation.key, || {
            "relation reference must not be empty".to_string()
        })?;
        let mut columns = HashSet::new();
        for column in &relation.columns {
            check(columns.insert(column.name.as_str()), &relation.key, || {
                format!("duplicate column {}", column.name)
            })?;
        }
        by_key.insert(relation.key.as_str(), relation);
    }
    Ok(by_key)
}

fn validate_joins(joins: &[Join], relations: &HashMap<&str, &Relation>) -> Result<()> {
    check_unique_keys("join", joins.iter().map(|j| j.key.as_str()))?;

    // (left, right) -> (join key, normalized criteria)
    let mut pairs: HashMap<(&str, &str), (&str, String)> = HashMap::new();

    for join in joins {
        let left = relations
            .get(join.left_relation_key.as_str())
            .ok_or_else(|| {
                SemgraphError::integrity(
                    &join.key,
                    format!("left relation {} not found", join.left_relation_key),
                )
            })?;
        let right = relations
            .get(join.right_relation_key.as_str())
            .ok_or_else(|| {
                SemgraphError::integrity(
                    &join.key,
                    format!("right relation {} not found", join.right_relation_key),
                )
            })?;
        check(left.key != right.key, &join.key, || {
            "self joins are not supported".to_string()
        })?;
        check(!join.criteria.trim().is_empty(), &join.key, || {
            "join criteria must not be empty".to_string()
        })?;

        let criteria = Expression::parse(&join.criteria)
            .map_err(|e| SemgraphError::integrity(&join.key, e.to_string()))?;
        let mut sides = (false, false);
        for column in criteria.column_refs() {
            let qualifier = column.qualifier.as_deref().ok_or_else(|| {
                SemgraphError::integrity(
                    &join.key,
                    format!(
                        "criteria column {} must be qualified by a relation",
                        column.raw()
                    ),
                )
            })?;
            let (matches_left, matches_right) =
                (left.answers_to(qualifier), right.answers_to(qualifier));
            let side = match (matches_left, matches_right) {
                (true, false) => *left,
                (false, true) => *right,
                (true, true) => {
                    return Err(SemgraphError::integrity(
                        &join.key,
                        format!("qualifier {qualifier} is ambiguous; use the relation key"),
                    ))
                }
                (false, false) => {
                    return Err(SemgraphError::integrity(
                        &join.key,
                        format!(
                            "criteria references {qualifier}, which is neither {} nor {}",
                            left.key, right.key
                        ),
                    ))
                }
            };
            check(
                side.columns.is_empty() || side.has_column(&column.name),
                &join.key,
                || format!("column {} not declared on {}", column.name, side.key),
            )?;
            if matches_left {
                sides.0 = true;
            } else {
                sides.1 = true;
            }
        }
        check(sides.0 && sides.1, &join.key, || {
            "criteria must reference both relations".to_string()
        })?;

        let normalized = criteria.normalized();
        let pair = (join.left_relation_key.as_str(), join.right_relation_key.as_str());
        if let Some((other_key, other_criteria)) = pairs.get(&pair) {
            check(*other_criteria == normalized, &join.key, || {
                format!("conflicts with join {other_key} over the same relations")
            })?;
        } else {
            pairs.insert(pair, (join.key.as_str(), normalized));
        }
    }
    Ok(())
}

fn validate_bound_expression(
    kind: &str,
    key: &str,
    expression: &str,
    relation_key: &str,
    relations: &HashMap<&str, &Relation>,
) -> Result<()> {
    let relation = relations.get(relation_key).ok_or_else(|| {
        SemgraphError::integrity(key, format!("{kind} relation {relation_key} not found"))
    })?;
    check(!expression.trim().is_empty(), key, || {
        format!("{kind} expression must not be empty")
    })?;
    let parsed =
        Expression::parse(expression).map_err(|e| SemgraphError::integrity(key, e.to_string()))?;
    for column in parsed.column_refs() {
        if let Some(qualifier) = &column.qualifier {
            check(relation.answers_to(qualifier), key, || {
                format!(
                    "{kind} may only reference its own relation {}, found {}",
                    relation.key,
                    column.raw()
                )
            })?;
            check(
                relation.columns.is_empty() || relation.has_column(&column.name),
                key,
                || format!("column {} not declared on {}", column.name, relation.key),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, JoinTerm};

    fn relations() -> Vec<Relation> {
        vec![
            Relation::table("sales", "orders", &[("id", "int"), ("customer_id", "int")]),
            Relation::table("sales", "customers", &[("id", "int")]),
        ]
    }

    fn join(key: &str, criteria: &str) -> Join {
        Join::new(
            key,
            "sales.orders",
            "sales.customers",
            criteria,
            Cardinality::ManyToOne,
            JoinTerm::Left,
        )
    }

    fn integrity_key(result: Result<()>) -> String {
        match result {
            Err(SemgraphError::ModelIntegrity { key, .. }) => key,
            other => panic!("expected integrity error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_consistent_definitions() {
        let joins = vec![join("oc", "orders.customer_id = customers.id")];
        let metrics = vec![Metric::new("order_count", "COUNT(id)", "sales.orders")];
        validate_definitions(&relations(), &joins, &metrics, &[]).unwrap();
    }

    #[test]
    fn rejects_duplicate_relation_keys() {
        let mut rels = relations();
        rels.push(Relation::table("sales", "orders", &[]));
        assert_eq!(
            integrity_key(validate_definitions(&rels, &[], &[], &[])),
            "sales.orders"
        );
    }

    #[test]
    fn rejects_criteria_for_foreign_relation() {
        let joins = vec![join("oc", "orders.customer_id = products.id")];
        assert_eq!(
            integrity_key(validate_definitions(&relations(), &joins, &[], &[])),
            "oc"
        );
    }

    #[test]
    fn rejects_undeclared_criteria_column() {
        let joins = vec![join("oc", "orders.customer_id = customers.customer_key")];
        assert_eq!(
            integrity_key(validate_definitions(&relations(), &joins, &[], &[])),
            "oc"
        );
    }

    #[test]
    fn rejects_conflicting_parallel_joins() {
        let joins = vec![
            join("oc", "orders.customer_id = customers.id"),
            join("oc_by_id", "orders.id = customers.id"),
        ];
        assert_eq!(
            integrity_key(validate_definitions(&relations(), &joins, &[], &[])),
            "oc_by_id"
        );
    }

    #[test]
    fn rejects_metric_on_missing_relation() {
        let metrics = vec![Metric::new("revenue", "SUM(amount)", "sales.invoices")];
        assert_eq!(
            integrity_key(validate_definitions(&relations(), &[], &metrics, &[])),
            "revenue"
        );
    }

    #[test]
    fn rejects_dimension_reaching_into_other_relation() {
        let dims = vec![Dimension::new("country", "customers.id", "sales.orders")];
        assert_eq!(
            integrity_key(validate_definitions(&relations(), &[], &[], &dims)),
            "country"
        );
    }
}
