use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SemgraphError>;

/// Which entity table a key was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Relation,
    Join,
    Metric,
    Dimension,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Relation => "relation",
            EntityKind::Join => "join",
            EntityKind::Metric => "metric",
            EntityKind::Dimension => "dimension",
        };
        f.write_str(name)
    }
}

/// A caller-supplied key with no entry in the semantic model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingKey {
    pub kind: EntityKind,
    pub key: String,
}

impl MissingKey {
    pub fn new(kind: EntityKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.key)
    }
}

fn join_missing(keys: &[MissingKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum SemgraphError {
    #[error("model integrity error on '{key}': {reason}")]
    ModelIntegrity { key: String, reason: String },
    #[error("unknown key(s): {}", join_missing(.0))]
    UnknownKey(Vec<MissingKey>),
    #[error("no join path connects relations: {}", .relations.join(", "))]
    NoJoinPath { relations: Vec<String> },
    #[error("ambiguous join path from '{root}' to '{relation}': {paths} shortest paths")]
    AmbiguousJoinPath {
        root: String,
        relation: String,
        paths: usize,
    },
    #[error("dialect {dialect} cannot express {construct}")]
    UnsupportedDialectConstruct {
        dialect: &'static str,
        construct: String,
    },
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("execution error: {0}")]
    Execution(String),
    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SemgraphError {
    pub(crate) fn integrity(key: impl Into<String>, reason: impl Into<String>) -> Self {
        SemgraphError::ModelIntegrity {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unknown(kind: EntityKind, key: impl Into<String>) -> Self {
        SemgraphError::UnknownKey(vec![MissingKey::new(kind, key)])
    }
}
