use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use contracts::{MarketFill, MarketOrder, MarketQuote, OrderSide};

use crate::server::{AppState, HttpApiError};
use crate::unix_now;

pub async fn quote(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<MarketQuote>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.market_quote(&tenant)?))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

fn parse_side(raw: &str) -> Result<OrderSide, HttpApiError> {
    OrderSide::parse(&raw.to_uppercase())
        .ok_or_else(|| HttpApiError::bad_request("INVALID_SIDE", "side must be BUY or SELL"))
}

pub async fn list(
    State(state): State<AppState>,
    Path((tenant, side)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MarketOrder>>, HttpApiError> {
    let side = parse_side(&side)?;
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.list_market_orders(
        &tenant,
        side,
        query.limit.unwrap_or(10),
        unix_now(),
    )?))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    Path((tenant, user)): Path<(String, String)>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MarketOrder>>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.list_my_market_orders(
        &tenant,
        &user,
        query.limit.unwrap_or(25),
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    tenant_id: String,
    user_id: String,
    side: String,
    shares: u64,
    price_per_share: u64,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<MarketOrder>, HttpApiError> {
    let side = parse_side(&request.side)?;
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.create_market_order(
        &request.tenant_id,
        &request.user_id,
        side,
        request.shares,
        request.price_per_share,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    tenant_id: String,
    user_id: String,
    order_id: String,
}

pub async fn cancel(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<MarketOrder>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.cancel_market_order(
        &request.tenant_id,
        &request.user_id,
        &request.order_id,
        unix_now(),
    )?))
}

#[derive(Debug, Deserialize)]
pub struct FillRequest {
    tenant_id: String,
    user_id: String,
    order_id: String,
    shares: u64,
}

pub async fn buy(
    State(state): State<AppState>,
    Json(request): Json<FillRequest>,
) -> Result<Json<MarketFill>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.execute_market_buy(
        &request.tenant_id,
        &request.user_id,
        &request.order_id,
        request.shares,
        unix_now(),
    )?))
}

pub async fn sell(
    State(state): State<AppState>,
    Json(request): Json<FillRequest>,
) -> Result<Json<MarketFill>, HttpApiError> {
    let mut cartel = state.cartel.lock().await;
    Ok(Json(cartel.execute_market_sell(
        &request.tenant_id,
        &request.user_id,
        &request.order_id,
        request.shares,
        unix_now(),
    )?))
}
