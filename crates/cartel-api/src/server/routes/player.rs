use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use contracts::{
    DivestReceipt, InvestReceipt, Overview, RankTableEntry, StashSaleReceipt, TransactionRecord,
    WarehouseCollectReceipt, WarehouseExportReceipt,
};

use crate::server::{AppState, HttpApiError};
use crate::unix_now;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

pub async fn overview(
    State(state): State<AppState>,
    Path((tenant, user)): Path<(String, String)>,
) -> Result<Json<Overview>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.overview(&tenant, &user)?))
}

pub async fn history(
    State(state): State<AppState>,
    Path((tenant, user)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<TransactionRecord>>, HttpApiError> {
    let limit = query.limit.unwrap_or(25).clamp(1, 100);
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.history(&tenant, &user, limit)?))
}

pub async fn rank_table() -> Json<Vec<RankTableEntry>> {
    Json(cartel_core::progression::rank_xp_table())
}

#[derive(Debug, Deserialize)]
pub struct InvestRequest {
    tenant_id: String,
    user_id: String,
    chips: u64,
}

pub async fn invest(
    State(state): State<AppState>,
    Json(request): Json<InvestRequest>,
) -> Result<Json<InvestReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.invest(
        &request.tenant_id,
        &request.user_id,
        request.chips,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct DivestRequest {
    tenant_id: String,
    user_id: String,
    shares: u64,
}

pub async fn divest(
    State(state): State<AppState>,
    Json(request): Json<DivestRequest>,
) -> Result<Json<DivestReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.divest(
        &request.tenant_id,
        &request.user_id,
        request.shares,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct StashSellRequest {
    tenant_id: String,
    user_id: String,
    mg: u64,
}

pub async fn sell_stash(
    State(state): State<AppState>,
    Json(request): Json<StashSellRequest>,
) -> Result<Json<StashSaleReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.sell_stash(
        &request.tenant_id,
        &request.user_id,
        request.mg,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct WarehouseCollectRequest {
    tenant_id: String,
    user_id: String,
    mg: u64,
}

pub async fn collect_warehouse(
    State(state): State<AppState>,
    Json(request): Json<WarehouseCollectRequest>,
) -> Result<Json<WarehouseCollectReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.collect_warehouse(
        &request.tenant_id,
        &request.user_id,
        request.mg,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct WarehouseExportRequest {
    tenant_id: String,
    user_id: String,
    mg: Option<u64>,
}

pub async fn export_warehouse(
    State(state): State<AppState>,
    Json(request): Json<WarehouseExportRequest>,
) -> Result<Json<WarehouseExportReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.export_warehouse(
        &request.tenant_id,
        &request.user_id,
        request.mg,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct WarehouseAbandonRequest {
    tenant_id: String,
    user_id: String,
    mg: u64,
}

pub async fn abandon_warehouse(
    State(state): State<AppState>,
    Json(request): Json<WarehouseAbandonRequest>,
) -> Result<Json<serde_json::Value>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    let burned_mg = cartel.abandon_warehouse(
        &request.tenant_id,
        &request.user_id,
        request.mg,
        unix_now(),
    )?;
    Ok(Json(serde_json::json!({ "burned_mg": burned_mg })))
}
