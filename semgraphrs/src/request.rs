use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A simplified query: metrics grouped by dimensions with optional filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Overrides the configured default dialect.
    pub dialect: Option<String>,
}

impl QueryRequest {
    pub fn new<M, D>(metrics: M, dimensions: D) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            metrics: metrics.into_iter().map(Into::into).collect(),
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order.push(OrderItem {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = Some(dialect.into());
        self
    }
}

/// `field op value` over a dimension key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    #[serde(default)]
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==", alias = "=")]
    Eq,
    #[serde(rename = "!=", alias = "<>")]
    Neq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "is null")]
    IsNull,
    #[serde(rename = "is not null")]
    IsNotNull,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_from_json() {
        let request: QueryRequest = serde_json::from_value(json!({
            "metrics": ["revenue"],
            "dimensions": ["country"],
            "filters": [{"field": "country", "op": "in", "value": ["US", "CA"]}],
            "order": [{"field": "revenue", "direction": "desc"}],
            "limit": 10
        }))
        .unwrap();
        assert_eq!(request.filters[0].op, FilterOp::In);
        assert_eq!(request.order[0].direction, SortDirection::Desc);
        assert_eq!(request.limit, Some(10));
        assert_eq!(request.dialect, None);
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed: Result<QueryRequest, _> =
            serde_json::from_value(json!({"metrics": ["revenue"], "measures": []}));
        assert!(parsed.is_err());
    }
}
