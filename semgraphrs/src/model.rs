//! Semantic model entities: relations, joins, metrics and dimensions.
//!
//! Entities are plain immutable values. Cross-references between them are
//! checked once when a [`crate::registry::SemanticModel`] is constructed.

use serde::{Deserialize, Serialize};

/// Build the globally unique key of a relation from its schema and reference.
pub fn relation_key(schema: &str, reference: &str) -> String {
    if schema.is_empty() {
        reference.to_string()
    } else {
        format!("{schema}.{reference}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    #[default]
    Table,
    View,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A queryable table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RelationDef")]
pub struct Relation {
    pub key: String,
    pub schema: String,
    pub reference: String,
    pub kind: RelationKind,
    pub columns: Vec<Column>,
    pub description: Option<String>,
}

/// On-disk shape of a relation; the key is always derived.
#[derive(Debug, Clone, Deserialize)]
struct RelationDef {
    #[serde(default)]
    schema: String,
    reference: String,
    #[serde(default)]
    kind: RelationKind,
    #[serde(default)]
    columns: Vec<Column>,
    description: Option<String>,
}

impl From<RelationDef> for Relation {
    fn from(def: RelationDef) -> Self {
        let mut relation = Relation::new(def.schema, def.reference, def.kind, def.columns);
        relation.description = def.description;
        relation
    }
}

impl Relation {
    pub fn new(
        schema: impl Into<String>,
        reference: impl Into<String>,
        kind: RelationKind,
        columns: Vec<Column>,
    ) -> Self {
        let schema = schema.into();
        let reference = reference.into();
        Self {
            key: relation_key(&schema, &reference),
            schema,
            reference,
            kind,
            columns,
            description: None,
        }
    }

    pub fn table(schema: &str, reference: &str, columns: &[(&str, &str)]) -> Self {
        Self::new(
            schema,
            reference,
            RelationKind::Table,
            columns
                .iter()
                .map(|(name, data_type)| Column::new(*name, *data_type))
                .collect(),
        )
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether `qualifier` in `qualifier.column` designates this relation.
    pub fn answers_to(&self, qualifier: &str) -> bool {
        qualifier == self.key || qualifier == self.reference
    }
}

/// Row multiplicity between the left and right side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// The same relationship seen from the other side.
    pub fn reversed(self) -> Self {
        match self {
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            other => other,
        }
    }

    /// Whether joining left → right can repeat left rows.
    pub fn fans_out(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JoinTerm {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinTerm {
    /// The equivalent term once the two sides are swapped.
    pub fn flipped(self) -> Self {
        match self {
            JoinTerm::Left => JoinTerm::Right,
            JoinTerm::Right => JoinTerm::Left,
            other => other,
        }
    }
}

/// A declared, bidirectionally navigable connection between two relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub key: String,
    pub left_relation_key: String,
    pub right_relation_key: String,
    pub criteria: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub join_term: JoinTerm,
    #[serde(default)]
    pub description: Option<String>,
}

impl Join {
    pub fn new(
        key: impl Into<String>,
        left_relation_key: impl Into<String>,
        right_relation_key: impl Into<String>,
        criteria: impl Into<String>,
        cardinality: Cardinality,
        join_term: JoinTerm,
    ) -> Self {
        Self {
            key: key.into(),
            left_relation_key: left_relation_key.into(),
            right_relation_key: right_relation_key.into(),
            criteria: criteria.into(),
            cardinality,
            join_term,
            description: None,
        }
    }
}

/// A named aggregate measure bound to one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub expression: String,
    pub relation_key: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Metric {
    pub fn new(
        key: impl Into<String>,
        expression: impl Into<String>,
        relation_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            expression: expression.into(),
            relation_key: relation_key.into(),
            description: None,
        }
    }
}

/// A named scalar attribute bound to one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    pub expression: String,
    pub relation_key: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Dimension {
    pub fn new(
        key: impl Into<String>,
        expression: impl Into<String>,
        relation_key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            expression: expression.into(),
            relation_key: relation_key.into(),
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_key_joins_schema_and_reference() {
        assert_eq!(relation_key("sales", "orders"), "sales.orders");
        assert_eq!(relation_key("", "orders"), "orders");
    }

    #[test]
    fn relation_deserializes_with_derived_key() {
        let yaml = r#"
schema: sales
reference: orders
kind: view
columns:
  - name: id
    data_type: integer
"#;
        let relation: Relation = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(relation.key, "sales.orders");
        assert_eq!(relation.kind, RelationKind::View);
        assert!(relation.has_column("id"));
        assert!(relation.answers_to("orders"));
        assert!(relation.answers_to("sales.orders"));
    }

    #[test]
    fn reversing_swaps_one_and_many() {
        assert_eq!(Cardinality::OneToMany.reversed(), Cardinality::ManyToOne);
        assert_eq!(Cardinality::ManyToMany.reversed(), Cardinality::ManyToMany);
        assert!(Cardinality::OneToMany.fans_out());
        assert!(!Cardinality::ManyToOne.fans_out());
        assert_eq!(JoinTerm::Left.flipped(), JoinTerm::Right);
        assert_eq!(JoinTerm::Full.flipped(), JoinTerm::Full);
    }
}
