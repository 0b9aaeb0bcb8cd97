use clap::{Arg, Command};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("Sales Warehouse ETL")
        .version("1.0")
        .about("Rebuilds the sales warehouse from both operational stores")
        .subcommand(
            Command::new("etl")
                .about("Run the full-refresh ETL")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            let config_path = etl_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/warehouse.toml");
            println!("Starting ETL with config: {}", config_path);

            match etl::run_etl_pipeline(config_path).await {
                Ok(report) => {
                    for line in report.lines() {
                        println!("{}", line);
                    }
                    if !report.completed {
                        process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("ETL error: {}", e);
                    process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
