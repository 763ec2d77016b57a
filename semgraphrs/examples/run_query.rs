use std::{fs, path::Path};

use semgraph::{
    config::SemgraphConfig, loader::load_from_dir, runtime::run_query, telemetry::init_logging,
    DuckDbExecutor, ModelHandle, QueryCompiler, QueryRequest,
};

fn bootstrap_duckdb(path: &Path) -> anyhow::Result<()> {
    let conn = duckdb::Connection::open(path)?;
    conn.execute_batch(
        "
        CREATE TABLE customers (
            id INTEGER PRIMARY KEY,
            name VARCHAR,
            country VARCHAR
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            customer_id INTEGER,
            status VARCHAR,
            amount DOUBLE
        );
        CREATE TABLE refunds (
            id INTEGER PRIMARY KEY,
            order_id INTEGER,
            amount DOUBLE
        );
        INSERT INTO customers VALUES
            (1, 'Alice', 'US'),
            (2, 'Bob', 'UK'),
            (3, 'Carla', 'US');
        INSERT INTO orders VALUES
            (1, 1, 'complete', 100.0),
            (2, 1, 'complete', 50.0),
            (3, 2, 'open', 25.0);
        INSERT INTO refunds VALUES
            (1, 1, 10.0);
        ",
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SemgraphConfig::load_default();
    init_logging(&config.logging);

    let db_path = Path::new("examples/demo.duckdb");
    if db_path.exists() {
        fs::remove_file(db_path)?;
    }
    bootstrap_duckdb(db_path)?;

    let executor = DuckDbExecutor::with_config(db_path, &config.execution);
    let model_dir = config
        .model
        .dir
        .clone()
        .unwrap_or_else(|| "examples/models".into());
    let models = ModelHandle::new(load_from_dir(&model_dir)?);
    let compiler = QueryCompiler::new(config.compiler);

    let request: QueryRequest = serde_json::from_str(&fs::read_to_string(
        "examples/requests/revenue_by_country.json",
    )?)?;

    let model = models.snapshot();
    let output = run_query(&compiler, &model, &executor, &request).await?;
    println!("SQL: {}", output.compiled.sql);
    println!("rows: {}", output.rows.len());
    for row in output.rows {
        println!("{row:?}");
    }
    Ok(())
}
