use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{EntityKind, Result, SemgraphError};
use crate::join_graph::{JoinGraph, JoinPlan, PathMode};
use crate::model::{Dimension, Join, Metric, Relation};
use crate::validation::validate_definitions;

/// Insertion-ordered key → entity table.
#[derive(Debug, Clone)]
struct Entities<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Entities<T> {
    fn new(items: Vec<T>, key: impl Fn(&T) -> &str) -> Self {
        let index = items
            .iter()
            .enumerate()
            .map(|(i, item)| (key(item).to_string(), i))
            .collect();
        Self { items, index }
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|i| &self.items[*i])
    }
}

/// A metric or dimension resolved to its owning relation.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'m> {
    pub key: &'m str,
    pub relation: &'m Relation,
    pub expression: &'m str,
}

/// Validated, immutable set of relations, joins, metrics and dimensions.
#[derive(Debug, Clone)]
pub struct SemanticModel {
    relations: Entities<Relation>,
    joins: Entities<Join>,
    metrics: Entities<Metric>,
    dimensions: Entities<Dimension>,
    touching: HashMap<String, Vec<usize>>,
    graph: JoinGraph,
}

impl SemanticModel {
    pub fn new(
        relations: Vec<Relation>,
        joins: Vec<Join>,
        metrics: Vec<Metric>,
        dimensions: Vec<Dimension>,
    ) -> Result<Self> {
        validate_definitions(&relations, &joins, &metrics, &dimensions)?;

        let mut touching: HashMap<String, Vec<usize>> = relations
            .iter()
            .map(|r| (r.key.clone(), Vec::new()))
            .collect();
        for (position, join) in joins.iter().enumerate() {
            for side in [&join.left_relation_key, &join.right_relation_key] {
                touching.entry(side.clone()).or_default().push(position);
            }
        }
        let graph = JoinGraph::build(&relations, &joins);

        let model = Self {
            relations: Entities::new(relations, |r| r.key.as_str()),
            joins: Entities::new(joins, |j| j.key.as_str()),
            metrics: Entities::new(metrics, |m| m.key.as_str()),
            dimensions: Entities::new(dimensions, |d| d.key.as_str()),
            touching,
            graph,
        };
        tracing::debug!(
            relations = model.relations.items.len(),
            joins = model.joins.items.len(),
            metrics = model.metrics.items.len(),
            dimensions = model.dimensions.items.len(),
            "semantic model constructed"
        );
        Ok(model)
    }

    pub fn relation(&self, key: &str) -> Result<&Relation> {
        self.relations
            .get(key)
            .ok_or_else(|| SemgraphError::unknown(EntityKind::Relation, key))
    }

    pub fn metric(&self, key: &str) -> Option<&Metric> {
        self.metrics.get(key)
    }

    pub fn dimension(&self, key: &str) -> Option<&Dimension> {
        self.dimensions.get(key)
    }

    pub fn join(&self, key: &str) -> Option<&Join> {
        self.joins.get(key)
    }

    pub fn resolve_metric(&self, key: &str) -> Result<Resolved<'_>> {
        let metric = self
            .metric(key)
            .ok_or_else(|| SemgraphError::unknown(EntityKind::Metric, key))?;
        Ok(Resolved {
            key: &metric.key,
            relation: self.relation(&metric.relation_key)?,
            expression: &metric.expression,
        })
    }

    pub fn resolve_dimension(&self, key: &str) -> Result<Resolved<'_>> {
        let dimension = self
            .dimension(key)
            .ok_or_else(|| SemgraphError::unknown(EntityKind::Dimension, key))?;
        Ok(Resolved {
            key: &dimension.key,
            relation: self.relation(&dimension.relation_key)?,
            expression: &dimension.expression,
        })
    }

    /// Joins with `relation_key` on either side, in declaration order.
    pub fn joins_touching(&self, relation_key: &str) -> Result<Vec<&Join>> {
        let positions = self
            .touching
            .get(relation_key)
            .ok_or_else(|| SemgraphError::unknown(EntityKind::Relation, relation_key))?;
        Ok(positions.iter().map(|i| &self.joins.items[*i]).collect())
    }

    /// Connect `required` relations; the first one is the root.
    pub fn resolve_join_plan(&self, required: &[&str], mode: PathMode) -> Result<JoinPlan<'_>> {
        self.graph.resolve(&self.joins.items, required, mode)
    }

    pub fn join_graph(&self) -> &JoinGraph {
        &self.graph
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.items.iter()
    }

    pub fn joins(&self) -> impl Iterator<Item = &Join> {
        self.joins.items.iter()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.items.iter()
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &Dimension> {
        self.dimensions.items.iter()
    }
}

/// Shared pointer to the current model; readers keep the snapshot they took.
#[derive(Debug)]
pub struct ModelHandle {
    current: RwLock<Arc<SemanticModel>>,
}

impl ModelHandle {
    pub fn new(model: SemanticModel) -> Self {
        Self {
            current: RwLock::new(Arc::new(model)),
        }
    }

    pub fn snapshot(&self) -> Arc<SemanticModel> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the current model. The previous snapshot stays valid for its holders.
    pub fn publish(&self, model: SemanticModel) -> Arc<SemanticModel> {
        let model = Arc::new(model);
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = model.clone();
        tracing::info!(
            relations = model.relations.items.len(),
            metrics = model.metrics.items.len(),
            dimensions = model.dimensions.items.len(),
            "published semantic model"
        );
        model
    }

    /// Validate a complete definition set and publish it; on error the current model is kept.
    pub fn reload(
        &self,
        relations: Vec<Relation>,
        joins: Vec<Join>,
        metrics: Vec<Metric>,
        dimensions: Vec<Dimension>,
    ) -> Result<Arc<SemanticModel>> {
        let model = SemanticModel::new(relations, joins, metrics, dimensions)?;
        Ok(self.publish(model))
    }

    pub fn reload_from_dir<P: AsRef<Path>>(&self, dir: P) -> Result<Arc<SemanticModel>> {
        let model = crate::loader::load_from_dir(dir)?;
        Ok(self.publish(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, JoinTerm};

    fn model() -> SemanticModel {
        SemanticModel::new(
            vec![
                Relation::table("", "orders", &[("id", "int"), ("customer_id", "int")]),
                Relation::table("", "customers", &[("id", "int"), ("country", "text")]),
                Relation::table("", "inventory", &[]),
            ],
            vec![Join::new(
                "orders_customers",
                "orders",
                "customers",
                "orders.customer_id = customers.id",
                Cardinality::ManyToOne,
                JoinTerm::Left,
            )],
            vec![Metric::new("order_count", "COUNT(id)", "orders")],
            vec![Dimension::new("country", "country", "customers")],
        )
        .unwrap()
    }

    #[test]
    fn resolves_metric_to_relation_and_expression() {
        let model = model();
        let resolved = model.resolve_metric("order_count").unwrap();
        assert_eq!(resolved.relation.key, "orders");
        assert_eq!(resolved.expression, "COUNT(id)");
        assert!(matches!(
            model.resolve_metric("country"),
            Err(SemgraphError::UnknownKey(_))
        ));
    }

    #[test]
    fn joins_touching_lists_both_sides() {
        let model = model();
        assert_eq!(model.joins_touching("customers").unwrap().len(), 1);
        assert!(model.joins_touching("inventory").unwrap().is_empty());
        assert!(model.joins_touching("nope").is_err());
    }
}
