use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use cartel_core::service::dealers::{DealerListing, FireAllReceipt};
use contracts::{Dealer, DealerCollectReceipt, UpkeepReceipt};

use crate::server::{AppState, HttpApiError};
use crate::unix_now;

pub async fn list(
    State(state): State<AppState>,
    Path((tenant, user)): Path<(String, String)>,
) -> Result<Json<Vec<DealerListing>>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.list_dealers(&tenant, &user)?))
}

#[derive(Debug, Deserialize)]
pub struct HireRequest {
    tenant_id: String,
    user_id: String,
    tier: u8,
    display_name: Option<String>,
}

pub async fn hire(
    State(state): State<AppState>,
    Json(request): Json<HireRequest>,
) -> Result<Json<Dealer>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.hire_dealer(
        &request.tenant_id,
        &request.user_id,
        request.tier,
        request.display_name,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct UpkeepRequest {
    tenant_id: String,
    user_id: String,
    dealer_id: String,
    chips: u64,
}

pub async fn pay_upkeep(
    State(state): State<AppState>,
    Json(request): Json<UpkeepRequest>,
) -> Result<Json<UpkeepReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.pay_dealer_upkeep(
        &request.tenant_id,
        &request.user_id,
        &request.dealer_id,
        request.chips,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct FireRequest {
    tenant_id: String,
    user_id: String,
    dealer_id: String,
}

pub async fn fire(
    State(state): State<AppState>,
    Json(request): Json<FireRequest>,
) -> Result<Json<Dealer>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.fire_dealer(
        &request.tenant_id,
        &request.user_id,
        &request.dealer_id,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct FireAllRequest {
    tenant_id: String,
    user_id: String,
}

pub async fn fire_all(
    State(state): State<AppState>,
    Json(request): Json<FireAllRequest>,
) -> Result<Json<FireAllReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.fire_all_dealers(
        &request.tenant_id,
        &request.user_id,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    tenant_id: String,
    user_id: String,
}

pub async fn collect(
    State(state): State<AppState>,
    Json(request): Json<CollectRequest>,
) -> Result<Json<DealerCollectReceipt>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.collect_dealer_chips(
        &request.tenant_id,
        &request.user_id,
        unix_now(),
    )?))
}
