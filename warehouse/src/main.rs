use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use common::config::Settings;
use common::db::{Connections, StoreId};
use std::process;
use tracing_subscriber::EnvFilter;
use warehouse::query::{QueryExecutor, QueryOutcome};

const DEFAULT_CONFIG: &str = "config/warehouse.toml";

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .help("Sets a custom config file")
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("Sales Warehouse")
        .version("1.0")
        .about("Serves the sales warehouse API and runs ad hoc read-only queries")
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP API")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("query")
                .about("Run one read-only query against a store")
                .arg(config_arg())
                .arg(
                    Arg::new("store")
                        .short('s')
                        .long("store")
                        .value_name("STORE")
                        .default_value("warehouse")
                        .help("warehouse, db1 or db2"),
                )
                .arg(Arg::new("sql").required(true).help("The SELECT to run")),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("serve", serve_matches)) => serve(serve_matches).await,
        Some(("query", query_matches)) => query(query_matches).await,
        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn config_path(matches: &ArgMatches) -> &str {
    matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG)
}

async fn serve(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = config_path(matches);
    println!("Starting warehouse API with config: {}", config_path);
    warehouse::run_warehouse_server(config_path)
        .await
        .context("warehouse API server stopped")
}

async fn query(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = config_path(matches);
    let store: StoreId = matches
        .get_one::<String>("store")
        .map(|s| s.as_str())
        .unwrap_or("warehouse")
        .parse()?;
    let sql = matches
        .get_one::<String>("sql")
        .context("missing SQL argument")?;

    let settings = Settings::new(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let connections = Connections::connect(&settings)
        .await
        .context("opening store connections")?;

    let outcome = QueryExecutor::new(settings.query.row_limit)
        .run(connections.get(store).as_ref(), sql)
        .await?;

    match outcome {
        QueryOutcome::Rows { columns, rows, note } => {
            if let Some(note) = note {
                println!("{}", note);
            }
            println!("{}", columns.join("\t"));
            for row in &rows {
                let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join("\t"));
            }
            println!("({} rows)", rows.len());
        }
        QueryOutcome::NoResultSet { message } => println!("{}", message),
        QueryOutcome::Error { message } => anyhow::bail!(message),
    }
    Ok(())
}
