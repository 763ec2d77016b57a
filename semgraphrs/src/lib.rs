pub mod backends;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod expr;
pub mod join_graph;
pub mod loader;
pub mod model;
pub mod query_builder;
pub mod query_parser;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod sql_ast;
pub mod telemetry;
pub mod validation;

use std::path::Path;

use crate::error::Result;
use crate::query_builder::CompiledQuery;

/// Load YAML definitions from a directory and build a validated model.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<SemanticModel> {
    loader::load_from_dir(model_dir)
}

/// Parse a text query and compile it with the named dialect.
pub fn compile_text(model: &SemanticModel, query: &str, dialect: &str) -> Result<CompiledQuery> {
    let request = query_parser::parse_query(query)?;
    query_builder::compile(model, &request, dialect::dialect_for(dialect)?)
}

#[cfg(feature = "duckdb")]
pub use backends::DuckDbExecutor;
pub use config::SemgraphConfig;
pub use dialect::{dialect_for, Dialect, DialectKind};
pub use error::SemgraphError;
pub use executor::{QueryExecutor, QueryResult};
pub use join_graph::{JoinPlan, JoinStep, PathMode};
pub use model::{Cardinality, Dimension, Join, JoinTerm, Metric, Relation};
pub use query_builder::{QueryCompiler, Strategy};
pub use query_parser::parse_query;
pub use registry::{ModelHandle, SemanticModel};
pub use request::{Filter, FilterOp, QueryRequest, SortDirection};
