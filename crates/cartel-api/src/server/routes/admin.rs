use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use contracts::{Pool, SweepReport};

use crate::server::{AppState, HttpApiError};
use crate::unix_now;

#[derive(Debug, Deserialize)]
pub struct TickRequest {
    tenant_id: Option<String>,
    now: Option<u64>,
}

pub async fn tick(
    State(state): State<AppState>,
    Json(request): Json<TickRequest>,
) -> Result<Json<SweepReport>, HttpApiError> {
    let now = request.now.unwrap_or_else(unix_now);
    let mut cartel = state.cartel.lock().await;
    Ok(Json(
        cartel.run_production_tick(request.tenant_id.as_deref(), now)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct SharePriceRequest {
    tenant_id: String,
    price: u64,
}

pub async fn set_share_price(
    State(state): State<AppState>,
    Json(request): Json<SharePriceRequest>,
) -> Result<Json<Pool>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.set_share_price(&request.tenant_id, request.price)?))
}

#[derive(Debug, Deserialize)]
pub struct ShareRateRequest {
    tenant_id: String,
    mg_per_hour: u64,
}

pub async fn set_share_rate(
    State(state): State<AppState>,
    Json(request): Json<ShareRateRequest>,
) -> Result<Json<Pool>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(
        cartel.set_share_rate(&request.tenant_id, request.mg_per_hour)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct XpRateRequest {
    tenant_id: String,
    milli_per_gram: u64,
}

pub async fn set_xp_per_gram(
    State(state): State<AppState>,
    Json(request): Json<XpRateRequest>,
) -> Result<Json<Pool>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(
        cartel.set_xp_per_gram(&request.tenant_id, request.milli_per_gram)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResetInvestorRequest {
    tenant_id: String,
    user_id: String,
}

pub async fn reset_investor(
    State(state): State<AppState>,
    Json(request): Json<ResetInvestorRequest>,
) -> Result<Json<serde_json::Value>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    cartel.reset_investor(&request.tenant_id, &request.user_id)?;
    Ok(Json(serde_json::json!({ "reset": true })))
}

/// Mints chips into a user wallet, or into the house bank when no user is
/// named. Bootstrap/testing hook, not part of the player surface.
#[derive(Debug, Deserialize)]
pub struct MintRequest {
    tenant_id: String,
    user_id: Option<String>,
    chips: u64,
}

pub async fn mint(
    State(state): State<AppState>,
    Json(request): Json<MintRequest>,
) -> Result<Json<serde_json::Value>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    let store = cartel.store_mut();
    let result = match request.user_id.as_deref() {
        Some(user) => store.mint_to_user(&request.tenant_id, user, request.chips),
        None => store.mint_to_house(&request.tenant_id, request.chips),
    };
    result.map_err(|err| HttpApiError::internal("mint failed", Some(err.to_string())))?;
    Ok(Json(serde_json::json!({ "minted": request.chips })))
}
