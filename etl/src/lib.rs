pub mod key_map;
pub mod loaders;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod reset;
pub mod schema;
pub mod sources;

pub use pipeline::{EtlOrchestrator, EtlReport};
pub use report::{LogEntry, LogStatus};

use common::Result;
use common::config::Settings;
use common::db::Connections;

/// Runs one full ETL refresh against the stores named in `config_path`.
///
/// Only configuration and connection problems surface as errors; everything
/// that goes wrong once the run has started is recorded in the report.
pub async fn run_etl_pipeline(config_path: &str) -> Result<EtlReport> {
    let settings = Settings::new(config_path)?;
    let connections = Connections::connect(&settings).await?;
    Ok(run_with(&connections).await)
}

/// Runs the ETL over already opened connections.
pub async fn run_with(connections: &Connections) -> EtlReport {
    EtlOrchestrator::new(
        connections.db1.as_ref(),
        connections.db2.as_ref(),
        connections.warehouse.as_ref(),
    )
    .run()
    .await
}
