use std::path::Path;

use serde_json::{json, Map, Value};

use semgraph::{
    dialect::{Dialect, PostgresDialect},
    executor::ColumnMeta,
    loader::load_from_yaml_str,
    runtime::run_query,
    DuckDbExecutor, Filter, FilterOp, QueryCompiler, QueryExecutor, QueryRequest, QueryResult,
    SemanticModel, SemgraphError, SortDirection, Strategy,
};

const MODEL: &str = r#"
relations:
  - reference: customers
    columns:
      - { name: id, data_type: integer }
      - { name: country, data_type: varchar }
  - reference: orders
    columns:
      - { name: id, data_type: integer }
      - { name: customer_id, data_type: integer }
      - { name: amount, data_type: double }
joins:
  - key: orders_customers
    left_relation_key: orders
    right_relation_key: customers
    criteria: orders.customer_id = customers.id
    cardinality: many_to_one
metrics:
  - key: revenue
    expression: SUM(amount)
    relation_key: orders
  - key: customer_count
    expression: COUNT(id)
    relation_key: customers
dimensions:
  - key: country
    expression: country
    relation_key: customers
  - key: order_amount
    expression: amount
    relation_key: orders
"#;

fn bootstrap_duckdb(db_path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(db_path)?;
    conn.execute_batch(
        "
        CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            country VARCHAR
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER,
            amount DOUBLE
        );
        INSERT INTO customers VALUES (1, 'US');
        INSERT INTO orders VALUES
            (1, 1, 10.0),
            (2, 1, 20.0),
            (3, 1, 30.0);
        ",
    )?;
    Ok(())
}

fn model() -> SemanticModel {
    load_from_yaml_str(MODEL).expect("model loads")
}

#[tokio::test]
async fn pre_aggregation_keeps_totals_exact() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("fanout.duckdb");
    bootstrap_duckdb(&db_path)?;

    let executor = DuckDbExecutor::new(&db_path).with_max_concurrency(1);
    let compiler = QueryCompiler::default();
    let model = model();

    let totals = QueryRequest::new(["revenue", "customer_count"], Vec::<String>::new());
    let output = run_query(&compiler, &model, &executor, &totals).await?;
    assert_eq!(output.compiled.strategy, Strategy::PreAggregated);
    assert_eq!(output.compiled.columns, vec!["revenue", "customer_count"]);
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0]["revenue"], json!(60.0));
    // A flat join would repeat the customer once per order.
    assert_eq!(output.rows[0]["customer_count"], json!(1));

    let by_country = QueryRequest::new(["revenue", "customer_count"], ["country"]);
    let output = run_query(&compiler, &model, &executor, &by_country).await?;
    assert_eq!(output.rows.len(), 1);
    let row = &output.rows[0];
    assert_eq!(row["revenue"], json!(60.0));
    assert_eq!(row["customer_count"], json!(1));
    assert_eq!(row["country"], json!("US"));
    Ok(())
}

#[tokio::test]
async fn filter_on_many_side_keeps_one_side_count_exact() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("semi_join.duckdb");
    bootstrap_duckdb(&db_path)?;

    let executor = DuckDbExecutor::new(&db_path);
    let compiler = QueryCompiler::default();
    let model = model();

    // Every order matches, and the one customer must still count once.
    let request = QueryRequest::new(["customer_count"], Vec::<String>::new())
        .filter(Filter::new("order_amount", FilterOp::Gt, 0));
    let output = run_query(&compiler, &model, &executor, &request).await?;
    assert_eq!(output.compiled.strategy, Strategy::Flat);
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0]["customer_count"], json!(1));

    let request = QueryRequest::new(["revenue", "customer_count"], Vec::<String>::new())
        .filter(Filter::new("order_amount", FilterOp::Gt, 15));
    let output = run_query(&compiler, &model, &executor, &request).await?;
    assert_eq!(output.compiled.strategy, Strategy::PreAggregated);
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0]["revenue"], json!(50.0));
    assert_eq!(output.rows[0]["customer_count"], json!(1));

    // No order matches, so no customer qualifies.
    let request = QueryRequest::new(["customer_count"], ["country"])
        .filter(Filter::new("order_amount", FilterOp::Gt, 100));
    let output = run_query(&compiler, &model, &executor, &request).await?;
    assert!(output.rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn grouping_one_side_metric_by_many_side_dimension_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("rejected.duckdb");
    bootstrap_duckdb(&db_path)?;

    let executor = DuckDbExecutor::new(&db_path);
    let compiler = QueryCompiler::default();
    let model = model();

    for request in [
        QueryRequest::new(["customer_count"], ["order_amount"]),
        QueryRequest::new(["revenue", "customer_count"], ["order_amount"]),
    ] {
        let err = run_query(&compiler, &model, &executor, &request)
            .await
            .unwrap_err();
        assert!(matches!(err, SemgraphError::InvalidRequest(_)), "{err}");
    }

    // The many-side metric grouped by its own column still runs.
    let request =
        QueryRequest::new(["revenue"], ["order_amount"]).order_by("order_amount", SortDirection::Asc);
    let output = run_query(&compiler, &model, &executor, &request).await?;
    let amounts: Vec<&Value> = output.rows.iter().map(|row| &row["order_amount"]).collect();
    assert_eq!(amounts, vec![&json!(10.0), &json!(20.0), &json!(30.0)]);
    Ok(())
}

#[tokio::test]
async fn flat_query_runs_with_filters_and_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("flat.duckdb");
    bootstrap_duckdb(&db_path)?;

    let executor = DuckDbExecutor::new(&db_path);
    let request = QueryRequest::new(["revenue"], ["country"])
        .filter(Filter::new("country", FilterOp::Eq, "US"))
        .limit(5);
    let output = run_query(&QueryCompiler::default(), &model(), &executor, &request).await?;

    assert_eq!(output.compiled.strategy, Strategy::Flat);
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0]["revenue"], json!(60.0));
    Ok(())
}

#[tokio::test]
async fn request_dialect_must_match_executor() {
    let dir = tempfile::tempdir().unwrap();
    let executor = DuckDbExecutor::new(dir.path().join("unused.duckdb"));
    let request = QueryRequest::new(["revenue"], Vec::<String>::new()).dialect("postgres");

    let err = run_query(&QueryCompiler::default(), &model(), &executor, &request)
        .await
        .unwrap_err();
    assert!(matches!(err, SemgraphError::InvalidRequest(_)));
}

/// Returns one canned row under upper-cased column names.
struct ShoutingExecutor;

#[async_trait::async_trait]
impl QueryExecutor for ShoutingExecutor {
    fn dialect(&self) -> &'static dyn Dialect {
        &PostgresDialect
    }

    async fn execute(&self, _sql: &str) -> semgraph::error::Result<QueryResult> {
        let mut row = Map::new();
        row.insert("REVENUE".to_string(), json!(1.5));
        row.insert("COUNTRY".to_string(), Value::String("US".to_string()));
        Ok(QueryResult {
            columns: vec![
                ColumnMeta {
                    name: "REVENUE".to_string(),
                },
                ColumnMeta {
                    name: "COUNTRY".to_string(),
                },
            ],
            rows: vec![row],
        })
    }
}

#[tokio::test]
async fn rows_are_rekeyed_to_compiled_labels() -> anyhow::Result<()> {
    let request = QueryRequest::new(["revenue"], ["country"]);
    let output = run_query(
        &QueryCompiler::default(),
        &model(),
        &ShoutingExecutor,
        &request,
    )
    .await?;

    assert!(output.compiled.sql.starts_with("SELECT SUM(\"orders\".\"amount\")"));
    assert_eq!(output.rows[0]["revenue"], json!(1.5));
    assert_eq!(output.rows[0]["country"], json!("US"));
    Ok(())
}
