//! In-memory `Store` + `Ledger`, used by the test suites and ephemeral
//! runs. The ledger side tracks minted chips per tenant so tests can
//! assert conservation: house + all user balances always equals the
//! minted total, no matter which operations ran in between.

use std::collections::BTreeMap;

use contracts::{
    Dealer, DealerStatus, Investor, MarketOrder, OrderSide, OrderStatus, Pool,
    ProductionAllocation, TransactionRecord,
};

use crate::ledger::{Ledger, LedgerError};
use crate::store::{PendingClear, Store, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    pools: BTreeMap<String, Pool>,
    investors: BTreeMap<(String, String), Investor>,
    dealers: BTreeMap<(String, String), Dealer>,
    orders: BTreeMap<(String, String), MarketOrder>,
    transactions: Vec<TransactionRecord>,
    balances: BTreeMap<(String, String), u64>,
    house: BTreeMap<String, u64>,
    minted_by_tenant: BTreeMap<String, u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints chips into a user balance (test/bootstrap entry point).
    pub fn credit_user(&mut self, tenant: &str, user: &str, chips: u64) {
        *self
            .balances
            .entry((tenant.to_string(), user.to_string()))
            .or_insert(0) += chips;
        *self.minted_by_tenant.entry(tenant.to_string()).or_insert(0) += chips;
    }

    /// Mints chips into the house balance.
    pub fn fund_house(&mut self, tenant: &str, chips: u64) {
        *self.house.entry(tenant.to_string()).or_insert(0) += chips;
        *self.minted_by_tenant.entry(tenant.to_string()).or_insert(0) += chips;
    }

    pub fn user_balance(&self, tenant: &str, user: &str) -> u64 {
        self.balances
            .get(&(tenant.to_string(), user.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn house_balance(&self, tenant: &str) -> u64 {
        self.house.get(tenant).copied().unwrap_or(0)
    }

    pub fn transactions(&self) -> &[TransactionRecord] {
        &self.transactions
    }

    /// Chips are only created by the mint helpers; every transfer since must
    /// have conserved the per-tenant total.
    pub fn verify_conservation(&self) -> bool {
        self.minted_by_tenant.iter().all(|(tenant, minted)| {
            let users: u64 = self
                .balances
                .iter()
                .filter(|((t, _), _)| t == tenant)
                .map(|(_, chips)| *chips)
                .sum();
            users + self.house_balance(tenant) == *minted
        })
    }

    fn investor_entry(&mut self, tenant: &str, user: &str) -> &mut Investor {
        self.investors
            .entry((tenant.to_string(), user.to_string()))
            .or_insert_with(|| Investor::new(tenant, user))
    }
}

impl Store for MemoryStore {
    fn pool(&mut self, tenant: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.pools.get(tenant).cloned())
    }

    fn upsert_pool(&mut self, pool: &Pool) -> Result<(), StoreError> {
        self.pools.insert(pool.tenant_id.clone(), pool.clone());
        Ok(())
    }

    fn list_tenants(&mut self) -> Result<Vec<String>, StoreError> {
        Ok(self.pools.keys().cloned().collect())
    }

    fn update_pool_tick(
        &mut self,
        tenant: &str,
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError> {
        if let Some(pool) = self.pools.get_mut(tenant) {
            pool.last_tick_at = last_tick_at;
            pool.carryover_mg = carryover_mg;
        }
        Ok(())
    }

    fn investor(&mut self, tenant: &str, user: &str) -> Result<Investor, StoreError> {
        Ok(self.investor_entry(tenant, user).clone())
    }

    fn list_investors(&mut self, tenant: &str) -> Result<Vec<Investor>, StoreError> {
        Ok(self
            .investors
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, investor)| investor.clone())
            .collect())
    }

    fn add_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError> {
        self.investor_entry(tenant, user).shares += shares;
        Ok(())
    }

    fn remove_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError> {
        let investor = self.investor_entry(tenant, user);
        if investor.shares < shares {
            return Err(StoreError::InsufficientShares);
        }
        investor.shares -= shares;
        Ok(())
    }

    fn set_holdings(
        &mut self,
        tenant: &str,
        user: &str,
        stash_mg: u64,
        warehouse_mg: u64,
    ) -> Result<(), StoreError> {
        let investor = self.investor_entry(tenant, user);
        investor.stash_mg = stash_mg;
        investor.warehouse_mg = warehouse_mg;
        Ok(())
    }

    fn set_rank_and_xp(
        &mut self,
        tenant: &str,
        user: &str,
        rank: u32,
        rank_xp: u64,
    ) -> Result<(), StoreError> {
        let investor = self.investor_entry(tenant, user);
        investor.rank = rank;
        investor.rank_xp = rank_xp;
        Ok(())
    }

    fn adjust_sale_multiplier(
        &mut self,
        tenant: &str,
        user: &str,
        delta_bps: u64,
    ) -> Result<Investor, StoreError> {
        let investor = self.investor_entry(tenant, user);
        investor.sale_multiplier_bps += delta_bps;
        Ok(investor.clone())
    }

    fn apply_production(
        &mut self,
        tenant: &str,
        allocations: &[ProductionAllocation],
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError> {
        for allocation in allocations {
            let investor = self.investor_entry(tenant, &allocation.user_id);
            investor.stash_mg = allocation.stash_mg;
            investor.warehouse_mg = allocation.warehouse_mg;
            investor.rank = allocation.rank;
            investor.rank_xp = allocation.rank_xp;
        }
        self.update_pool_tick(tenant, last_tick_at, carryover_mg)
    }

    fn reset_investor(&mut self, tenant: &str, user: &str) -> Result<(), StoreError> {
        self.investors.insert(
            (tenant.to_string(), user.to_string()),
            Investor::new(tenant, user),
        );
        Ok(())
    }

    fn create_dealer(&mut self, dealer: &Dealer) -> Result<(), StoreError> {
        self.dealers.insert(
            (dealer.tenant_id.clone(), dealer.dealer_id.clone()),
            dealer.clone(),
        );
        Ok(())
    }

    fn list_dealers(&mut self, tenant: &str) -> Result<Vec<Dealer>, StoreError> {
        Ok(self
            .dealers
            .iter()
            .filter(|((t, _), _)| t == tenant)
            .map(|(_, dealer)| dealer.clone())
            .collect())
    }

    fn list_dealers_for_user(
        &mut self,
        tenant: &str,
        user: &str,
    ) -> Result<Vec<Dealer>, StoreError> {
        Ok(self
            .dealers
            .iter()
            .filter(|((t, _), dealer)| t == tenant && dealer.user_id == user)
            .map(|(_, dealer)| dealer.clone())
            .collect())
    }

    fn dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<Option<Dealer>, StoreError> {
        Ok(self
            .dealers
            .get(&(tenant.to_string(), dealer_id.to_string()))
            .cloned())
    }

    fn set_dealer_status(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        status: DealerStatus,
    ) -> Result<(), StoreError> {
        if let Some(dealer) = self
            .dealers
            .get_mut(&(tenant.to_string(), dealer_id.to_string()))
        {
            dealer.status = status;
        }
        Ok(())
    }

    fn set_dealer_upkeep(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        upkeep_due_at: u64,
        status: DealerStatus,
    ) -> Result<Option<Dealer>, StoreError> {
        let Some(dealer) = self
            .dealers
            .get_mut(&(tenant.to_string(), dealer_id.to_string()))
        else {
            return Ok(None);
        };
        dealer.upkeep_due_at = upkeep_due_at;
        dealer.status = status;
        Ok(Some(dealer.clone()))
    }

    fn record_dealer_sale(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        mg_sold: u64,
        sold_at: u64,
        chip_remainder_units: u64,
    ) -> Result<(), StoreError> {
        if let Some(dealer) = self
            .dealers
            .get_mut(&(tenant.to_string(), dealer_id.to_string()))
        {
            dealer.lifetime_sold_mg += mg_sold;
            dealer.last_sold_at = sold_at;
            dealer.chip_remainder_units = chip_remainder_units;
        }
        Ok(())
    }

    fn add_dealer_pending(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        chips: u64,
        mg: u64,
    ) -> Result<(), StoreError> {
        if let Some(dealer) = self
            .dealers
            .get_mut(&(tenant.to_string(), dealer_id.to_string()))
        {
            dealer.pending_chips += chips;
            dealer.pending_mg += mg;
        }
        Ok(())
    }

    fn clear_dealer_pending(
        &mut self,
        tenant: &str,
        entries: &[PendingClear],
    ) -> Result<(), StoreError> {
        for entry in entries {
            if let Some(dealer) = self
                .dealers
                .get_mut(&(tenant.to_string(), entry.dealer_id.clone()))
            {
                dealer.pending_chips = dealer.pending_chips.saturating_sub(entry.chips);
                dealer.pending_mg = dealer.pending_mg.saturating_sub(entry.mg);
            }
        }
        Ok(())
    }

    fn delete_dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<(), StoreError> {
        self.dealers
            .remove(&(tenant.to_string(), dealer_id.to_string()));
        Ok(())
    }

    fn delete_dealers_for_user(&mut self, tenant: &str, user: &str) -> Result<(), StoreError> {
        self.dealers
            .retain(|(t, _), dealer| !(t == tenant && dealer.user_id == user));
        Ok(())
    }

    fn create_order(&mut self, order: &MarketOrder) -> Result<(), StoreError> {
        self.orders.insert(
            (order.tenant_id.clone(), order.order_id.clone()),
            order.clone(),
        );
        Ok(())
    }

    fn list_orders(
        &mut self,
        tenant: &str,
        side: OrderSide,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError> {
        let mut orders: Vec<MarketOrder> = self
            .orders
            .iter()
            .filter(|((t, _), order)| {
                t == tenant && order.side == side && order.status == OrderStatus::Open
            })
            .map(|(_, order)| order.clone())
            .collect();
        orders.sort_by(|a, b| {
            let price = match side {
                OrderSide::Sell => a.price_per_share.cmp(&b.price_per_share),
                OrderSide::Buy => b.price_per_share.cmp(&a.price_per_share),
            };
            price
                .then(a.created_at.cmp(&b.created_at))
                .then(a.order_id.cmp(&b.order_id))
        });
        orders.truncate(limit);
        Ok(orders)
    }

    fn list_orders_for_user(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError> {
        let mut orders: Vec<MarketOrder> = self
            .orders
            .iter()
            .filter(|((t, _), order)| {
                t == tenant && order.user_id == user && order.status == OrderStatus::Open
            })
            .map(|(_, order)| order.clone())
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(a.order_id.cmp(&b.order_id))
        });
        orders.truncate(limit);
        Ok(orders)
    }

    fn order(&mut self, tenant: &str, order_id: &str) -> Result<Option<MarketOrder>, StoreError> {
        Ok(self
            .orders
            .get(&(tenant.to_string(), order_id.to_string()))
            .cloned())
    }

    fn set_order_status(
        &mut self,
        tenant: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if let Some(order) = self
            .orders
            .get_mut(&(tenant.to_string(), order_id.to_string()))
        {
            order.status = status;
        }
        Ok(())
    }

    fn set_order_shares(
        &mut self,
        tenant: &str,
        order_id: &str,
        shares: u64,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        if let Some(order) = self
            .orders
            .get_mut(&(tenant.to_string(), order_id.to_string()))
        {
            order.shares = shares;
            order.status = status;
        }
        Ok(())
    }

    fn record_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        self.transactions.push(record.clone());
        Ok(())
    }

    fn list_transactions(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records: Vec<TransactionRecord> = self
            .transactions
            .iter()
            .filter(|record| record.tenant_id == tenant && record.user_id == user)
            .cloned()
            .collect();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

impl Ledger for MemoryStore {
    fn transfer_user_to_house(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        _reason: &str,
    ) -> Result<(), LedgerError> {
        let key = (tenant.to_string(), user.to_string());
        let balance = self.balances.entry(key).or_insert(0);
        if *balance < chips {
            return Err(LedgerError::InsufficientUser);
        }
        *balance -= chips;
        *self.house.entry(tenant.to_string()).or_insert(0) += chips;
        Ok(())
    }

    fn transfer_house_to_user(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        _reason: &str,
    ) -> Result<(), LedgerError> {
        let house = self.house.entry(tenant.to_string()).or_insert(0);
        if *house < chips {
            return Err(LedgerError::InsufficientHouse);
        }
        *house -= chips;
        *self
            .balances
            .entry((tenant.to_string(), user.to_string()))
            .or_insert(0) += chips;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfers_conserve_minted_chips() {
        let mut store = MemoryStore::new();
        store.credit_user("t1", "alice", 500);
        store.fund_house("t1", 1_000);

        store
            .transfer_user_to_house("t1", "alice", 200, "test")
            .expect("user covered");
        store
            .transfer_house_to_user("t1", "alice", 700, "test")
            .expect("house covered");

        assert_eq!(store.user_balance("t1", "alice"), 1_000);
        assert_eq!(store.house_balance("t1"), 500);
        assert!(store.verify_conservation());
    }

    #[test]
    fn insufficient_transfers_move_nothing() {
        let mut store = MemoryStore::new();
        store.credit_user("t1", "alice", 100);

        let err = store
            .transfer_user_to_house("t1", "alice", 101, "test")
            .expect_err("short by one");
        assert_eq!(err, LedgerError::InsufficientUser);
        assert_eq!(store.user_balance("t1", "alice"), 100);

        let err = store
            .transfer_house_to_user("t1", "alice", 1, "test")
            .expect_err("house empty");
        assert_eq!(err, LedgerError::InsufficientHouse);
        assert!(store.verify_conservation());
    }

    #[test]
    fn remove_shares_refuses_overdraw() {
        let mut store = MemoryStore::new();
        store.add_shares("t1", "alice", 5).expect("add");
        let err = store.remove_shares("t1", "alice", 6).expect_err("overdraw");
        assert!(matches!(err, StoreError::InsufficientShares));
        assert_eq!(store.investor("t1", "alice").expect("investor").shares, 5);
    }

    #[test]
    fn sell_orders_list_cheapest_first() {
        let mut store = MemoryStore::new();
        for (id, price) in [("a", 30), ("b", 10), ("c", 20)] {
            store
                .create_order(&MarketOrder {
                    tenant_id: "t1".to_string(),
                    order_id: id.to_string(),
                    user_id: "alice".to_string(),
                    side: OrderSide::Sell,
                    shares: 10,
                    price_per_share: price,
                    status: OrderStatus::Open,
                    created_at: 1_000,
                })
                .expect("create");
        }
        let listed = store.list_orders("t1", OrderSide::Sell, 10).expect("list");
        let prices: Vec<u64> = listed.iter().map(|o| o.price_per_share).collect();
        assert_eq!(prices, vec![10, 20, 30]);
    }
}
