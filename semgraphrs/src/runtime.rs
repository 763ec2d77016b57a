use serde_json::{Map, Value};

use crate::error::{Result, SemgraphError};
use crate::executor::QueryExecutor;
use crate::query_builder::{CompiledQuery, QueryCompiler};
use crate::registry::SemanticModel;
use crate::request::QueryRequest;

#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub compiled: CompiledQuery,
    /// One map per row, keyed by output label.
    pub rows: Vec<Map<String, Value>>,
}

/// Compile `request` for the executor's dialect and run it.
pub async fn run_query(
    compiler: &QueryCompiler,
    model: &SemanticModel,
    executor: &dyn QueryExecutor,
    request: &QueryRequest,
) -> Result<QueryOutput> {
    let dialect = executor.dialect();
    if let Some(requested) = &request.dialect {
        let requested = crate::dialect::dialect_for(requested)?;
        if requested.name() != dialect.name() {
            return Err(SemgraphError::InvalidRequest(format!(
                "request targets {} but the executor speaks {}",
                requested.name(),
                dialect.name()
            )));
        }
    }

    let compiled = compiler.compile(model, request, dialect)?;
    let result = executor.execute(&compiled.sql).await?;

    let returned: Vec<String> = result.columns.iter().map(|c| c.name.clone()).collect();
    if returned.len() != compiled.columns.len() {
        return Err(SemgraphError::Execution(format!(
            "expected {} columns, backend returned {}",
            compiled.columns.len(),
            returned.len()
        )));
    }
    let rows = if returned
        .iter()
        .zip(&compiled.columns)
        .all(|(got, want)| got == want)
    {
        result.rows
    } else {
        // Backends may fold label case; rekey positionally.
        result
            .rows
            .into_iter()
            .map(|mut row| {
                returned
                    .iter()
                    .zip(&compiled.columns)
                    .map(|(got, label)| (label.clone(), row.remove(got).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    };

    tracing::debug!(rows = rows.len(), strategy = ?compiled.strategy, "query executed");
    Ok(QueryOutput { compiled, rows })
}
