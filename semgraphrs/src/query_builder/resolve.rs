//! Request resolution: keys to relations and parsed expressions.

use std::collections::{HashMap, HashSet};

use crate::error::{EntityKind, MissingKey, Result, SemgraphError};
use crate::expr::Expression;
use crate::model::Relation;
use crate::registry::SemanticModel;
use crate::request::{Filter, FilterOp, QueryRequest};

/// A requested metric or dimension with its relation and parsed expression.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedField<'m> {
    pub key: &'m str,
    pub relation: &'m Relation,
    pub expression: Expression,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedFilter<'m, 'r> {
    pub field: ResolvedField<'m>,
    pub filter: &'r Filter,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedRequest<'m, 'r> {
    pub metrics: Vec<ResolvedField<'m>>,
    pub dimensions: Vec<ResolvedField<'m>>,
    pub filters: Vec<ResolvedFilter<'m, 'r>>,
}

impl<'m> ResolvedRequest<'m, '_> {
    /// Metric relations, then dimension relations, then filter relations; deduplicated.
    pub fn required_relations(&self) -> Vec<&'m str> {
        let mut seen = HashSet::new();
        self.metrics
            .iter()
            .chain(self.dimensions.iter())
            .chain(self.filters.iter().map(|f| &f.field))
            .map(|field| field.relation.key.as_str())
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// Distinct relations owning at least one requested metric, in request order.
    pub fn metric_relations(&self) -> Vec<&'m Relation> {
        let mut seen = HashSet::new();
        self.metrics
            .iter()
            .map(|m| m.relation)
            .filter(|r| seen.insert(r.key.as_str()))
            .collect()
    }

    /// Output labels: metrics in request order, then dimensions.
    pub fn labels(&self) -> Vec<String> {
        self.metrics
            .iter()
            .chain(self.dimensions.iter())
            .map(|f| f.key.to_string())
            .collect()
    }
}

pub(crate) fn resolve_request<'m, 'r>(
    model: &'m SemanticModel,
    request: &'r QueryRequest,
) -> Result<ResolvedRequest<'m, 'r>> {
    if request.metrics.is_empty() && request.dimensions.is_empty() {
        return Err(SemgraphError::InvalidRequest(
            "request must name at least one metric or dimension".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for key in request.metrics.iter().chain(request.dimensions.iter()) {
        if !seen.insert(key.as_str()) {
            return Err(SemgraphError::InvalidRequest(format!(
                "{key} is requested more than once"
            )));
        }
    }

    let mut missing = Vec::new();
    let mut metrics = Vec::with_capacity(request.metrics.len());
    for key in &request.metrics {
        match model.metric(key) {
            Some(metric) => metrics.push(field(
                model,
                &metric.key,
                &metric.relation_key,
                &metric.expression,
            )?),
            None => missing.push(MissingKey::new(EntityKind::Metric, key.as_str())),
        }
    }
    let mut dimensions = Vec::with_capacity(request.dimensions.len());
    for key in &request.dimensions {
        match dimension_field(model, key)? {
            Some(field) => dimensions.push(field),
            None => missing.push(MissingKey::new(EntityKind::Dimension, key.as_str())),
        }
    }
    let mut filters = Vec::with_capacity(request.filters.len());
    for filter in &request.filters {
        match dimension_field(model, &filter.field)? {
            Some(field) => filters.push(ResolvedFilter { field, filter }),
            None => missing.push(MissingKey::new(EntityKind::Dimension, filter.field.as_str())),
        }
    }
    if !missing.is_empty() {
        return Err(SemgraphError::UnknownKey(missing));
    }

    for item in &request.order {
        if !seen.contains(item.field.as_str()) {
            return Err(SemgraphError::InvalidRequest(format!(
                "cannot order by {}, it is not a requested metric or dimension",
                item.field
            )));
        }
    }

    for filter in &request.filters {
        let empty_list = match &filter.value {
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        };
        if matches!(filter.op, FilterOp::In | FilterOp::NotIn) && empty_list {
            return Err(SemgraphError::InvalidRequest(format!(
                "filter on {} has an empty value list",
                filter.field
            )));
        }
    }

    Ok(ResolvedRequest {
        metrics,
        dimensions,
        filters,
    })
}

fn field<'m>(
    model: &'m SemanticModel,
    key: &'m str,
    relation_key: &str,
    expression: &str,
) -> Result<ResolvedField<'m>> {
    Ok(ResolvedField {
        key,
        relation: model.relation(relation_key)?,
        expression: Expression::parse(expression)?,
    })
}

fn dimension_field<'m>(model: &'m SemanticModel, key: &str) -> Result<Option<ResolvedField<'m>>> {
    match model.dimension(key) {
        Some(d) => Ok(Some(field(model, &d.key, &d.relation_key, &d.expression)?)),
        None => Ok(None),
    }
}

/// SQL aliases for the relations of one SELECT: the relation reference, suffixed on collision.
#[derive(Debug, Default)]
pub(crate) struct Aliases {
    by_relation: HashMap<String, String>,
    taken: HashSet<String>,
}

impl Aliases {
    pub fn alias(&mut self, relation: &Relation) -> String {
        self.assign(&relation.key, &relation.reference)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_relation.get(key).map(String::as_str)
    }

    /// Alias for `key`, derived from `base` the first time `key` is seen.
    pub fn assign(&mut self, key: &str, base: &str) -> String {
        if let Some(alias) = self.by_relation.get(key) {
            return alias.clone();
        }
        let mut alias = base.to_string();
        let mut n = 2;
        while self.taken.contains(&alias) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        self.taken.insert(alias.clone());
        self.by_relation.insert(key.to_string(), alias.clone());
        alias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_disambiguate_shared_references() {
        let mut aliases = Aliases::default();
        let sales = Relation::table("sales", "orders", &[]);
        let archive = Relation::table("archive", "orders", &[]);
        assert_eq!(aliases.alias(&sales), "orders");
        assert_eq!(aliases.alias(&archive), "orders_2");
        assert_eq!(aliases.alias(&sales), "orders");
    }
}
