use std::{env, fs, path::PathBuf};

use semgraph::{
    config::SemgraphConfig, loader::load_from_dir, parse_query, telemetry::init_logging,
    QueryCompiler, QueryRequest,
};

fn usage() {
    eprintln!("Usage: print_sql <models_dir> <request.json | query text>");
    eprintln!("Example: cargo run --example print_sql -- examples/models examples/requests/revenue_by_country.json");
    eprintln!("Example: cargo run --example print_sql -- examples/models \"METRICS revenue DIMENSIONS country DIALECT postgres\"");
}

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1).collect::<Vec<_>>();
    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let config = SemgraphConfig::load_default();
    init_logging(&config.logging);

    let models_dir = PathBuf::from(args.remove(0));
    let source = args.remove(0);

    let model = load_from_dir(models_dir)?;
    let request: QueryRequest = if source.ends_with(".json") {
        serde_json::from_str(&fs::read_to_string(&source)?)?
    } else {
        parse_query(&source)?
    };

    let compiler = QueryCompiler::new(config.compiler);
    let compiled = compiler.compile_request(&model, &request)?;
    println!("-- strategy: {:?}", compiled.strategy);
    println!("-- columns: {}", compiled.columns.join(", "));
    println!("{}", compiled.sql);
    Ok(())
}
