use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use common::db::StoreId;
use etl::EtlReport;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::models::{ApiResponse, QueryRequest};
use crate::query::{QueryOutcome, StoreTables};
use crate::services::{AppError, WarehouseService};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

pub async fn run_etl(State(service): State<Arc<WarehouseService>>) -> ApiResult<EtlReport> {
    let report = service.run_etl().await?;
    Ok(Json(ApiResponse::success(report)))
}

// Backend errors are a regular outcome here; only rejected input is an HTTP error
pub async fn run_query(
    State(service): State<Arc<WarehouseService>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<QueryOutcome> {
    let outcome = service.query(request.store, &request.sql).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn list_tables(
    Path(store): Path<String>,
    State(service): State<Arc<WarehouseService>>,
) -> ApiResult<StoreTables> {
    let store: StoreId = store.parse()?;
    Ok(Json(ApiResponse::success(service.tables(store))))
}

pub async fn browse_table(
    Path((store, table)): Path<(String, String)>,
    State(service): State<Arc<WarehouseService>>,
) -> ApiResult<QueryOutcome> {
    let store: StoreId = store.parse()?;
    let outcome = service.browse(store, &table).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

// Define all API routes
pub fn routes(service: Arc<WarehouseService>) -> Router {
    Router::new()
        .route("/api/etl/run", post(run_etl))
        .route("/api/query", post(run_query))
        .route("/api/stores/{store}/tables", get(list_tables))
        .route("/api/stores/{store}/tables/{table}", get(browse_table))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
