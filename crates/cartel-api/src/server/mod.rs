//! HTTP facade for the command/UI layer. All mutating calls funnel through
//! one mutex so player operations and the tick worker serialize per
//! process.

mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use cartel_core::Cartel;

use crate::persistence::SqliteStore;

pub use error::{HttpApiError, ServerError};

pub type SharedCartel = Arc<Mutex<Cartel<SqliteStore>>>;

#[derive(Clone)]
pub struct AppState {
    pub cartel: SharedCartel,
}

impl AppState {
    pub fn new(cartel: Cartel<SqliteStore>) -> Self {
        Self {
            cartel: Arc::new(Mutex::new(cartel)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/overview/:tenant/:user", get(routes::player::overview))
        .route("/history/:tenant/:user", get(routes::player::history))
        .route("/rank-table", get(routes::player::rank_table))
        .route("/invest", post(routes::player::invest))
        .route("/divest", post(routes::player::divest))
        .route("/stash/sell", post(routes::player::sell_stash))
        .route("/warehouse/collect", post(routes::player::collect_warehouse))
        .route("/warehouse/export", post(routes::player::export_warehouse))
        .route("/warehouse/abandon", post(routes::player::abandon_warehouse))
        .route("/dealers/:tenant/:user", get(routes::dealers::list))
        .route("/dealers/hire", post(routes::dealers::hire))
        .route("/dealers/upkeep", post(routes::dealers::pay_upkeep))
        .route("/dealers/fire", post(routes::dealers::fire))
        .route("/dealers/fire-all", post(routes::dealers::fire_all))
        .route("/dealers/collect", post(routes::dealers::collect))
        .route("/market/quote/:tenant", get(routes::market::quote))
        .route("/market/orders/:tenant/:side", get(routes::market::list))
        .route(
            "/market/orders/:tenant/user/:user",
            get(routes::market::list_for_user),
        )
        .route("/market/orders", post(routes::market::create))
        .route("/market/orders/cancel", post(routes::market::cancel))
        .route("/market/buy", post(routes::market::buy))
        .route("/market/sell", post(routes::market::sell))
        .route("/tick", post(routes::admin::tick))
        .route("/admin/share-price", post(routes::admin::set_share_price))
        .route("/admin/share-rate", post(routes::admin::set_share_rate))
        .route("/admin/xp-per-gram", post(routes::admin::set_xp_per_gram))
        .route("/admin/reset-investor", post(routes::admin::reset_investor))
        .route("/admin/mint", post(routes::admin::mint))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), ServerError> {
    let app = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "cartel api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
