use common::Result;
use common::config::Settings;
use common::db::{Connections, StoreId};
use etl::EtlReport;
use tokio::sync::Mutex;
use tracing::info;

use crate::query::{QueryExecutor, QueryOutcome, StoreTables, TableBrowser};

/// Shared state behind the HTTP API: the three store sessions, the query
/// row cap and a gate that admits one ETL run at a time.
pub struct WarehouseService {
    connections: Connections,
    executor: QueryExecutor,
    etl_gate: Mutex<()>,
}

impl WarehouseService {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let connections = Connections::connect(settings).await?;
        Ok(Self::with_connections(connections, settings.query.row_limit))
    }

    pub fn with_connections(connections: Connections, row_limit: usize) -> Self {
        Self {
            connections,
            executor: QueryExecutor::new(row_limit),
            etl_gate: Mutex::new(()),
        }
    }

    /// Runs a full refresh. A trigger arriving while another run is in
    /// progress fails with [`common::Error::Lock`] instead of queueing.
    pub async fn run_etl(&self) -> Result<EtlReport> {
        let _running = self.etl_gate.try_lock()?;
        info!("ETL run started");
        let report = etl::run_with(&self.connections).await;
        info!(
            completed = report.completed,
            facts_loaded = report.facts_loaded,
            facts_skipped = report.facts_skipped,
            "ETL run finished"
        );
        Ok(report)
    }

    pub async fn query(&self, store: StoreId, sql: &str) -> Result<QueryOutcome> {
        self.executor
            .run(self.connections.get(store).as_ref(), sql)
            .await
    }

    pub fn tables(&self, store: StoreId) -> StoreTables {
        TableBrowser::describe(store)
    }

    pub async fn browse(&self, store: StoreId, table: &str) -> Result<QueryOutcome> {
        TableBrowser::browse(self.connections.get(store).as_ref(), store, table).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::AppError;
    use axum::http::StatusCode;
    use common::Error;
    use common::db::memory::MemoryConnection;
    use std::sync::Arc;

    fn service() -> WarehouseService {
        WarehouseService::with_connections(
            Connections::new(
                Arc::new(MemoryConnection::new("warehouse")),
                Arc::new(MemoryConnection::new("db1")),
                Arc::new(MemoryConnection::new("db2")),
            ),
            200,
        )
    }

    #[tokio::test]
    async fn test_second_etl_trigger_is_refused_while_running() {
        let service = service();
        let _running = service.etl_gate.lock().await;

        let err = service.run_etl().await.unwrap_err();

        assert!(matches!(err, Error::Lock(_)));
        assert_eq!(AppError(err).status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_gate_is_released_after_a_run() {
        let service = service();
        service.run_etl().await.unwrap();
        assert!(service.run_etl().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_instead_of_loading() {
        let db2 = MemoryConnection::new("db2");
        db2.disconnect();
        let service = WarehouseService::with_connections(
            Connections::new(
                Arc::new(MemoryConnection::new("warehouse")),
                Arc::new(MemoryConnection::new("db1")),
                Arc::new(db2),
            ),
            200,
        );

        let report = service.run_etl().await.unwrap();

        assert!(!report.completed);
        assert_eq!(
            report.lines(),
            vec!["❌ Connection to db2 failed: MySQL server has gone away"]
        );
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: Error| AppError(e).status_code();
        assert_eq!(status(Error::Validation("no".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(Error::NotFound("t".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(Error::connection("db1", "refused")), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(Error::Execution("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
