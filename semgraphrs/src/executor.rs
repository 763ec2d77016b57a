use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::dialect::Dialect;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Map<String, Value>>,
}

impl QueryResult {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Runs compiled SQL against a database. Implementations own their timeouts.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Dialect the backend understands.
    fn dialect(&self) -> &'static dyn Dialect;

    async fn execute(&self, sql: &str) -> Result<QueryResult>;
}
