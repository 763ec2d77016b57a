//! DuckDB execution backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::config::ExecutionConfig;
use crate::dialect::{Dialect, DuckDbDialect};
use crate::error::{Result, SemgraphError};
use crate::executor::{ColumnMeta, QueryExecutor, QueryResult};

/// DuckDB database file with a bounded number of in-flight queries.
#[derive(Clone)]
pub struct DuckDbExecutor {
    database_path: PathBuf,
    limiter: Arc<Semaphore>,
    pool: Arc<Mutex<Vec<duckdb::Connection>>>,
    timeout: Duration,
}

impl DuckDbExecutor {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(path, &ExecutionConfig::default())
    }

    pub fn with_config<P: AsRef<Path>>(path: P, config: &ExecutionConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        tracing::info!(
            path = %path.display(),
            max_concurrency = config.max_concurrency,
            "creating DuckDB executor"
        );
        Self {
            database_path: path,
            limiter: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            pool: Arc::new(Mutex::new(Vec::new())),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Configure maximum concurrent executions.
    pub fn with_max_concurrency(mut self, max_in_flight: usize) -> Self {
        tracing::debug!(max_concurrency = max_in_flight, "configuring DuckDB concurrency");
        self.limiter = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    async fn acquire_slot(&self) -> Result<OwnedSemaphorePermit> {
        if self.limiter.available_permits() == 0 {
            tracing::debug!("all DuckDB slots in use, waiting for permit");
        }
        self.limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SemgraphError::Execution(format!("limiter closed: {e}")))
    }

    async fn checkout_connection(&self) -> Result<duckdb::Connection> {
        let mut guard = self.pool.lock().await;
        if let Some(conn) = guard.pop() {
            let pool_size = guard.len();
            drop(guard);
            tracing::trace!(pool_remaining = pool_size, "reusing pooled DuckDB connection");
            return Ok(conn);
        }
        drop(guard);
        tracing::debug!(path = %self.database_path.display(), "opening new DuckDB connection");
        Ok(duckdb::Connection::open(&self.database_path)?)
    }

    /// The blocking task holds the slot and checks its connection back in
    /// itself, also when the caller has stopped waiting.
    async fn run(&self, sql: String) -> Result<QueryResult> {
        let permit = self.acquire_slot().await?;
        let conn = self.checkout_connection().await?;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let outcome = query(&conn, &sql);
            pool.blocking_lock().push(conn);
            drop(permit);
            outcome
        })
        .await
        .map_err(|e| SemgraphError::Execution(format!("task join error: {e}")))?
    }
}

fn query(conn: &duckdb::Connection, sql: &str) -> Result<QueryResult> {
    let start = Instant::now();
    let mut stmt = conn.prepare(sql)?;
    let mut rows_iter = stmt.query([])?;
    let stmt_ref = rows_iter
        .as_ref()
        .ok_or_else(|| SemgraphError::Execution("statement missing".to_string()))?;
    let mut column_names = Vec::new();
    for idx in 0..stmt_ref.column_count() {
        let name = stmt_ref
            .column_name(idx)
            .map_err(|e| SemgraphError::Execution(e.to_string()))?;
        column_names.push(name.to_string());
    }

    let mut rows = Vec::new();
    while let Some(row) = rows_iter.next()? {
        let mut map = Map::new();
        for (idx, name) in column_names.iter().enumerate() {
            map.insert(name.clone(), duck_value_to_json(row.get_ref(idx)?.to_owned()));
        }
        rows.push(map);
    }

    tracing::debug!(
        rows = rows.len(),
        columns = column_names.len(),
        ms = start.elapsed().as_millis(),
        "duckdb execute"
    );
    Ok(QueryResult {
        columns: column_names
            .into_iter()
            .map(|name| ColumnMeta { name })
            .collect(),
        rows,
    })
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    fn dialect(&self) -> &'static dyn Dialect {
        &DuckDbDialect
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        match tokio::time::timeout(self.timeout, self.run(sql.to_string())).await {
            Ok(result) => result,
            Err(_) => Err(SemgraphError::Execution(format!(
                "query timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

fn duck_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::from(i),
        DuckValue::SmallInt(i) => Value::from(i),
        DuckValue::Int(i) => Value::from(i),
        DuckValue::BigInt(i) => Value::from(i),
        DuckValue::HugeInt(i) => match i64::try_from(i) {
            Ok(small) => Value::from(small),
            Err(_) => Value::String(i.to_string()),
        },
        DuckValue::UTinyInt(i) => Value::from(i),
        DuckValue::USmallInt(i) => Value::from(i),
        DuckValue::UInt(i) => Value::from(i),
        DuckValue::UBigInt(i) => Value::from(i),
        DuckValue::Float(f) => Value::from(f),
        DuckValue::Double(f) => Value::from(f),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
        DuckValue::Date32(d) => Value::from(d),
        DuckValue::List(items) | DuckValue::Array(items) => {
            Value::Array(items.into_iter().map(duck_value_to_json).collect())
        }
        DuckValue::Union(inner) => duck_value_to_json(*inner),
        other => Value::String(format!("{other:?}")),
    }
}
