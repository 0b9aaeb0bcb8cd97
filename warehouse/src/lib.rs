pub mod api;
pub mod query;
pub mod services;

use common::Result;
use common::config::Settings;
use services::WarehouseService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Connects to all three stores and serves the ETL trigger, the query
/// gateway and the table browser until the process is stopped.
pub async fn run_warehouse_server(config_path: &str) -> Result<()> {
    let settings = Settings::new(config_path)?;
    let service = Arc::new(WarehouseService::new(&settings).await?);

    let api_router = api::routes(Arc::clone(&service));

    let listener = TcpListener::bind((settings.api_host.as_str(), settings.api_port)).await?;
    info!("Warehouse API server listening on {}", listener.local_addr()?);
    axum::serve(listener, api_router).await?;

    Ok(())
}
