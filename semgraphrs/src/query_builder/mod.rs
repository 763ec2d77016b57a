use serde::Serialize;

use crate::config::CompilerConfig;
use crate::dialect::{dialect_for, Dialect};
use crate::error::Result;
use crate::registry::SemanticModel;
use crate::request::QueryRequest;
use crate::sql_ast::SqlRenderer;

mod filters;
mod plan;
mod planner;
mod resolve;

/// Query shape chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Flat,
    PreAggregated,
}

/// SQL text plus the output column labels in projection order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub columns: Vec<String>,
    pub strategy: Strategy,
}

/// Compiles simplified queries against a semantic model. Holds no per-query state.
#[derive(Debug, Clone, Default)]
pub struct QueryCompiler {
    config: CompilerConfig,
}

impl QueryCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile with an explicit dialect; the request's own dialect name is ignored.
    pub fn compile(
        &self,
        model: &SemanticModel,
        request: &QueryRequest,
        dialect: &dyn Dialect,
    ) -> Result<CompiledQuery> {
        let resolved = resolve::resolve_request(model, request)?;
        let limit = self.config.effective_limit(request.limit);
        let plan = planner::build_plan(
            model,
            &resolved,
            request,
            limit,
            self.config.path_mode(),
        )?;
        let strategy = plan.strategy();
        let query = plan.into_select_query()?;
        let sql = SqlRenderer::new(dialect).render_select(&query)?;
        tracing::trace!(dialect = dialect.name(), ?strategy, sql = %sql, "compiled query");
        Ok(CompiledQuery {
            sql,
            columns: resolved.labels(),
            strategy,
        })
    }

    /// Compile with the request's dialect, falling back to the configured default.
    pub fn compile_request(
        &self,
        model: &SemanticModel,
        request: &QueryRequest,
    ) -> Result<CompiledQuery> {
        let dialect = match &request.dialect {
            Some(name) => dialect_for(name)?,
            None => self.config.dialect()?,
        };
        self.compile(model, request, dialect)
    }
}

/// Compile with default settings.
pub fn compile(
    model: &SemanticModel,
    request: &QueryRequest,
    dialect: &dyn Dialect,
) -> Result<CompiledQuery> {
    QueryCompiler::default().compile(model, request, dialect)
}
