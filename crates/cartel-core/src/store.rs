//! Durable state interface consumed by the engine.
//!
//! One concrete implementation is chosen at process startup (SQLite in the
//! API crate, the in-memory store for tests and ephemeral runs). Every
//! method is atomic per call; the engine re-reads live state before each
//! mutation instead of caching across calls.

use std::fmt;

use contracts::{
    Dealer, DealerStatus, Investor, MarketOrder, OrderSide, OrderStatus, Pool,
    ProductionAllocation, TransactionRecord,
};

#[derive(Debug)]
pub enum StoreError {
    /// A share decrement would push the investor below zero.
    InsufficientShares,
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientShares => write!(f, "investor does not hold that many shares"),
            Self::Backend(detail) => write!(f, "store backend error: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Cleared pending balances for one dealer, applied as a batch after a
/// successful payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClear {
    pub dealer_id: String,
    pub chips: u64,
    pub mg: u64,
}

pub trait Store {
    // Pools
    fn pool(&mut self, tenant: &str) -> Result<Option<Pool>, StoreError>;
    fn upsert_pool(&mut self, pool: &Pool) -> Result<(), StoreError>;
    fn list_tenants(&mut self) -> Result<Vec<String>, StoreError>;
    fn update_pool_tick(
        &mut self,
        tenant: &str,
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError>;

    // Investors
    /// Returns the investor row, creating a fresh rank-1 profile when absent.
    fn investor(&mut self, tenant: &str, user: &str) -> Result<Investor, StoreError>;
    fn list_investors(&mut self, tenant: &str) -> Result<Vec<Investor>, StoreError>;
    fn add_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError>;
    fn remove_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError>;
    fn set_holdings(
        &mut self,
        tenant: &str,
        user: &str,
        stash_mg: u64,
        warehouse_mg: u64,
    ) -> Result<(), StoreError>;
    fn set_rank_and_xp(
        &mut self,
        tenant: &str,
        user: &str,
        rank: u32,
        rank_xp: u64,
    ) -> Result<(), StoreError>;
    fn adjust_sale_multiplier(
        &mut self,
        tenant: &str,
        user: &str,
        delta_bps: u64,
    ) -> Result<Investor, StoreError>;
    /// Applies a full production tick as one atomic batch: every investor
    /// allocation plus the pool's `last_tick_at`/`carryover_mg`.
    fn apply_production(
        &mut self,
        tenant: &str,
        allocations: &[ProductionAllocation],
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError>;
    fn reset_investor(&mut self, tenant: &str, user: &str) -> Result<(), StoreError>;

    // Dealers
    fn create_dealer(&mut self, dealer: &Dealer) -> Result<(), StoreError>;
    fn list_dealers(&mut self, tenant: &str) -> Result<Vec<Dealer>, StoreError>;
    fn list_dealers_for_user(
        &mut self,
        tenant: &str,
        user: &str,
    ) -> Result<Vec<Dealer>, StoreError>;
    fn dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<Option<Dealer>, StoreError>;
    fn set_dealer_status(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        status: DealerStatus,
    ) -> Result<(), StoreError>;
    fn set_dealer_upkeep(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        upkeep_due_at: u64,
        status: DealerStatus,
    ) -> Result<Option<Dealer>, StoreError>;
    fn record_dealer_sale(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        mg_sold: u64,
        sold_at: u64,
        chip_remainder_units: u64,
    ) -> Result<(), StoreError>;
    fn add_dealer_pending(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        chips: u64,
        mg: u64,
    ) -> Result<(), StoreError>;
    fn clear_dealer_pending(
        &mut self,
        tenant: &str,
        entries: &[PendingClear],
    ) -> Result<(), StoreError>;
    fn delete_dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<(), StoreError>;
    fn delete_dealers_for_user(&mut self, tenant: &str, user: &str) -> Result<(), StoreError>;

    // Market orders
    fn create_order(&mut self, order: &MarketOrder) -> Result<(), StoreError>;
    /// Open orders on one side, best-priced first (ascending for sells,
    /// descending for buys), oldest first within a price level.
    fn list_orders(
        &mut self,
        tenant: &str,
        side: OrderSide,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError>;
    fn list_orders_for_user(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError>;
    fn order(&mut self, tenant: &str, order_id: &str) -> Result<Option<MarketOrder>, StoreError>;
    fn set_order_status(
        &mut self,
        tenant: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError>;
    fn set_order_shares(
        &mut self,
        tenant: &str,
        order_id: &str,
        shares: u64,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    // History
    fn record_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError>;
    fn list_transactions(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}
