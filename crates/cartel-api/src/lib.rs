//! SQLite persistence, HTTP facade, and the tick worker for the cartel
//! engine.

mod persistence;
mod server;
mod worker;

use std::time::{SystemTime, UNIX_EPOCH};

pub use persistence::{PersistenceError, SqliteStore};
pub use server::{build_router, serve, AppState, HttpApiError, ServerError, SharedCartel};
pub use worker::spawn_tick_worker;

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
