//! SQLite-backed `Store` + `Ledger`, chosen at process startup.

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use cartel_core::ledger::{Ledger, LedgerError};
use cartel_core::store::{PendingClear, Store, StoreError};
use contracts::{
    Dealer, DealerStatus, Investor, MarketOrder, OrderSide, OrderStatus, Pool,
    ProductionAllocation, TransactionKind, TransactionRecord,
};

#[derive(Debug)]
pub enum PersistenceError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite error: {err}"),
            Self::Serde(err) => write!(f, "serde error: {err}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

fn backend(err: impl fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn ledger_backend(err: impl fmt::Display) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cartel_pools (
                tenant_id TEXT PRIMARY KEY,
                share_price_chips INTEGER NOT NULL,
                share_rate_mg_per_hour INTEGER NOT NULL,
                xp_per_gram_sold_milli INTEGER NOT NULL,
                last_tick_at INTEGER NOT NULL DEFAULT 0,
                carryover_mg INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS cartel_investors (
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                shares INTEGER NOT NULL DEFAULT 0,
                stash_mg INTEGER NOT NULL DEFAULT 0,
                warehouse_mg INTEGER NOT NULL DEFAULT 0,
                rank INTEGER NOT NULL DEFAULT 1,
                rank_xp INTEGER NOT NULL DEFAULT 0,
                sale_multiplier_bps INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tenant_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS cartel_dealers (
                tenant_id TEXT NOT NULL,
                dealer_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                tier INTEGER NOT NULL,
                display_name TEXT,
                status TEXT NOT NULL,
                hourly_sell_cap_mg INTEGER NOT NULL,
                price_multiplier_bps INTEGER NOT NULL,
                upkeep_due_at INTEGER NOT NULL DEFAULT 0,
                chip_remainder_units INTEGER NOT NULL DEFAULT 0,
                pending_chips INTEGER NOT NULL DEFAULT 0,
                pending_mg INTEGER NOT NULL DEFAULT 0,
                lifetime_sold_mg INTEGER NOT NULL DEFAULT 0,
                last_sold_at INTEGER NOT NULL DEFAULT 0,
                hired_at INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tenant_id, dealer_id)
            );

            CREATE TABLE IF NOT EXISTS cartel_market_orders (
                tenant_id TEXT NOT NULL,
                order_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                side TEXT NOT NULL,
                shares INTEGER NOT NULL,
                price_per_share INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (tenant_id, order_id)
            );

            CREATE TABLE IF NOT EXISTS cartel_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                chips INTEGER NOT NULL,
                mg INTEGER NOT NULL,
                detail_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS user_balances (
                tenant_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                chips INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tenant_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS house_balances (
                tenant_id TEXT PRIMARY KEY,
                chips INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_dealers_tenant_user
                ON cartel_dealers(tenant_id, user_id);
            CREATE INDEX IF NOT EXISTS idx_orders_tenant_status_side
                ON cartel_market_orders(tenant_id, status, side, price_per_share);
            CREATE INDEX IF NOT EXISTS idx_orders_tenant_user
                ON cartel_market_orders(tenant_id, user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_transactions_tenant_user
                ON cartel_transactions(tenant_id, user_id, id);
            ",
        )?;
        Ok(())
    }

    // Ledger bootstrap helpers used by the CLI and admin routes.

    pub fn mint_to_user(&mut self, tenant: &str, user: &str, chips: u64) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO user_balances (tenant_id, user_id, chips) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, user_id) DO UPDATE SET chips = chips + excluded.chips",
            params![tenant, user, to_i64(chips)],
        )?;
        Ok(())
    }

    pub fn mint_to_house(&mut self, tenant: &str, chips: u64) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO house_balances (tenant_id, chips) VALUES (?1, ?2)
             ON CONFLICT(tenant_id) DO UPDATE SET chips = chips + excluded.chips",
            params![tenant, to_i64(chips)],
        )?;
        Ok(())
    }

    pub fn user_balance(&self, tenant: &str, user: &str) -> Result<u64, PersistenceError> {
        let chips: Option<i64> = self
            .conn
            .query_row(
                "SELECT chips FROM user_balances WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user],
                |row| row.get(0),
            )
            .optional()?;
        Ok(chips.map(to_u64).unwrap_or(0))
    }

    pub fn house_balance(&self, tenant: &str) -> Result<u64, PersistenceError> {
        let chips: Option<i64> = self
            .conn
            .query_row(
                "SELECT chips FROM house_balances WHERE tenant_id = ?1",
                params![tenant],
                |row| row.get(0),
            )
            .optional()?;
        Ok(chips.map(to_u64).unwrap_or(0))
    }

    fn ensure_investor_row(&mut self, tenant: &str, user: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR IGNORE INTO cartel_investors (tenant_id, user_id) VALUES (?1, ?2)",
            params![tenant, user],
        )?;
        Ok(())
    }
}

fn investor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Investor> {
    Ok(Investor {
        tenant_id: row.get(0)?,
        user_id: row.get(1)?,
        shares: to_u64(row.get(2)?),
        stash_mg: to_u64(row.get(3)?),
        warehouse_mg: to_u64(row.get(4)?),
        rank: u32::try_from(row.get::<_, i64>(5)?).unwrap_or(1),
        rank_xp: to_u64(row.get(6)?),
        sale_multiplier_bps: to_u64(row.get(7)?),
    })
}

const INVESTOR_COLUMNS: &str = "tenant_id, user_id, shares, stash_mg, warehouse_mg, rank, rank_xp, sale_multiplier_bps";

fn dealer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Dealer, String)> {
    let status_raw: String = row.get(5)?;
    Ok((
        Dealer {
            tenant_id: row.get(0)?,
            dealer_id: row.get(1)?,
            user_id: row.get(2)?,
            tier: u8::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
            display_name: row.get(4)?,
            status: DealerStatus::Paused,
            hourly_sell_cap_mg: to_u64(row.get(6)?),
            price_multiplier_bps: to_u64(row.get(7)?),
            upkeep_due_at: to_u64(row.get(8)?),
            chip_remainder_units: to_u64(row.get(9)?),
            pending_chips: to_u64(row.get(10)?),
            pending_mg: to_u64(row.get(11)?),
            lifetime_sold_mg: to_u64(row.get(12)?),
            last_sold_at: to_u64(row.get(13)?),
            hired_at: to_u64(row.get(14)?),
        },
        status_raw,
    ))
}

fn finish_dealer((mut dealer, status_raw): (Dealer, String)) -> Result<Dealer, StoreError> {
    dealer.status = DealerStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown dealer status {status_raw:?}")))?;
    Ok(dealer)
}

const DEALER_COLUMNS: &str = "tenant_id, dealer_id, user_id, tier, display_name, status, hourly_sell_cap_mg, price_multiplier_bps, upkeep_due_at, chip_remainder_units, pending_chips, pending_mg, lifetime_sold_mg, last_sold_at, hired_at";

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(MarketOrder, String, String)> {
    let side_raw: String = row.get(3)?;
    let status_raw: String = row.get(6)?;
    Ok((
        MarketOrder {
            tenant_id: row.get(0)?,
            order_id: row.get(1)?,
            user_id: row.get(2)?,
            side: OrderSide::Sell,
            shares: to_u64(row.get(4)?),
            price_per_share: to_u64(row.get(5)?),
            status: OrderStatus::Open,
            created_at: to_u64(row.get(7)?),
        },
        side_raw,
        status_raw,
    ))
}

fn finish_order(
    (mut order, side_raw, status_raw): (MarketOrder, String, String),
) -> Result<MarketOrder, StoreError> {
    order.side = OrderSide::parse(&side_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown order side {side_raw:?}")))?;
    order.status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::Backend(format!("unknown order status {status_raw:?}")))?;
    Ok(order)
}

const ORDER_COLUMNS: &str =
    "tenant_id, order_id, user_id, side, shares, price_per_share, status, created_at";

impl Store for SqliteStore {
    fn pool(&mut self, tenant: &str) -> Result<Option<Pool>, StoreError> {
        self.conn
            .query_row(
                "SELECT tenant_id, share_price_chips, share_rate_mg_per_hour,
                        xp_per_gram_sold_milli, last_tick_at, carryover_mg
                 FROM cartel_pools WHERE tenant_id = ?1",
                params![tenant],
                |row| {
                    Ok(Pool {
                        tenant_id: row.get(0)?,
                        share_price_chips: to_u64(row.get(1)?),
                        share_rate_mg_per_hour: to_u64(row.get(2)?),
                        xp_per_gram_sold_milli: to_u64(row.get(3)?),
                        last_tick_at: to_u64(row.get(4)?),
                        carryover_mg: to_u64(row.get(5)?),
                    })
                },
            )
            .optional()
            .map_err(backend)
    }

    fn upsert_pool(&mut self, pool: &Pool) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO cartel_pools (
                    tenant_id, share_price_chips, share_rate_mg_per_hour,
                    xp_per_gram_sold_milli, last_tick_at, carryover_mg
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(tenant_id) DO UPDATE SET
                    share_price_chips = excluded.share_price_chips,
                    share_rate_mg_per_hour = excluded.share_rate_mg_per_hour,
                    xp_per_gram_sold_milli = excluded.xp_per_gram_sold_milli,
                    last_tick_at = excluded.last_tick_at,
                    carryover_mg = excluded.carryover_mg",
                params![
                    pool.tenant_id.as_str(),
                    to_i64(pool.share_price_chips),
                    to_i64(pool.share_rate_mg_per_hour),
                    to_i64(pool.xp_per_gram_sold_milli),
                    to_i64(pool.last_tick_at),
                    to_i64(pool.carryover_mg),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn list_tenants(&mut self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT tenant_id FROM cartel_pools ORDER BY tenant_id")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(backend)?;
        let mut tenants = Vec::new();
        for row in rows {
            tenants.push(row.map_err(backend)?);
        }
        Ok(tenants)
    }

    fn update_pool_tick(
        &mut self,
        tenant: &str,
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_pools SET last_tick_at = ?2, carryover_mg = ?3
                 WHERE tenant_id = ?1",
                params![tenant, to_i64(last_tick_at), to_i64(carryover_mg)],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn investor(&mut self, tenant: &str, user: &str) -> Result<Investor, StoreError> {
        self.ensure_investor_row(tenant, user).map_err(backend)?;
        self.conn
            .query_row(
                &format!(
                    "SELECT {INVESTOR_COLUMNS} FROM cartel_investors
                     WHERE tenant_id = ?1 AND user_id = ?2"
                ),
                params![tenant, user],
                investor_from_row,
            )
            .map_err(backend)
    }

    fn list_investors(&mut self, tenant: &str) -> Result<Vec<Investor>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {INVESTOR_COLUMNS} FROM cartel_investors
                 WHERE tenant_id = ?1 ORDER BY user_id"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![tenant], investor_from_row)
            .map_err(backend)?;
        let mut investors = Vec::new();
        for row in rows {
            investors.push(row.map_err(backend)?);
        }
        Ok(investors)
    }

    fn add_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError> {
        self.ensure_investor_row(tenant, user).map_err(backend)?;
        self.conn
            .execute(
                "UPDATE cartel_investors SET shares = shares + ?3
                 WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user, to_i64(shares)],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn remove_shares(&mut self, tenant: &str, user: &str, shares: u64) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        let held: Option<i64> = tx
            .query_row(
                "SELECT shares FROM cartel_investors WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        if held.map(to_u64).unwrap_or(0) < shares {
            return Err(StoreError::InsufficientShares);
        }
        tx.execute(
            "UPDATE cartel_investors SET shares = shares - ?3
             WHERE tenant_id = ?1 AND user_id = ?2",
            params![tenant, user, to_i64(shares)],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn set_holdings(
        &mut self,
        tenant: &str,
        user: &str,
        stash_mg: u64,
        warehouse_mg: u64,
    ) -> Result<(), StoreError> {
        self.ensure_investor_row(tenant, user).map_err(backend)?;
        self.conn
            .execute(
                "UPDATE cartel_investors SET stash_mg = ?3, warehouse_mg = ?4
                 WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user, to_i64(stash_mg), to_i64(warehouse_mg)],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn set_rank_and_xp(
        &mut self,
        tenant: &str,
        user: &str,
        rank: u32,
        rank_xp: u64,
    ) -> Result<(), StoreError> {
        self.ensure_investor_row(tenant, user).map_err(backend)?;
        self.conn
            .execute(
                "UPDATE cartel_investors SET rank = ?3, rank_xp = ?4
                 WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user, i64::from(rank), to_i64(rank_xp)],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn adjust_sale_multiplier(
        &mut self,
        tenant: &str,
        user: &str,
        delta_bps: u64,
    ) -> Result<Investor, StoreError> {
        self.ensure_investor_row(tenant, user).map_err(backend)?;
        self.conn
            .execute(
                "UPDATE cartel_investors SET sale_multiplier_bps = sale_multiplier_bps + ?3
                 WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user, to_i64(delta_bps)],
            )
            .map_err(backend)?;
        self.investor(tenant, user)
    }

    fn apply_production(
        &mut self,
        tenant: &str,
        allocations: &[ProductionAllocation],
        last_tick_at: u64,
        carryover_mg: u64,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        for allocation in allocations {
            tx.execute(
                "INSERT OR IGNORE INTO cartel_investors (tenant_id, user_id) VALUES (?1, ?2)",
                params![tenant, allocation.user_id.as_str()],
            )
            .map_err(backend)?;
            tx.execute(
                "UPDATE cartel_investors
                 SET stash_mg = ?3, warehouse_mg = ?4, rank = ?5, rank_xp = ?6
                 WHERE tenant_id = ?1 AND user_id = ?2",
                params![
                    tenant,
                    allocation.user_id.as_str(),
                    to_i64(allocation.stash_mg),
                    to_i64(allocation.warehouse_mg),
                    i64::from(allocation.rank),
                    to_i64(allocation.rank_xp),
                ],
            )
            .map_err(backend)?;
        }
        tx.execute(
            "UPDATE cartel_pools SET last_tick_at = ?2, carryover_mg = ?3
             WHERE tenant_id = ?1",
            params![tenant, to_i64(last_tick_at), to_i64(carryover_mg)],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn reset_investor(&mut self, tenant: &str, user: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO cartel_investors (tenant_id, user_id)
                 VALUES (?1, ?2)
                 ON CONFLICT(tenant_id, user_id) DO UPDATE SET
                    shares = 0, stash_mg = 0, warehouse_mg = 0,
                    rank = 1, rank_xp = 0, sale_multiplier_bps = 0",
                params![tenant, user],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn create_dealer(&mut self, dealer: &Dealer) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO cartel_dealers (
                    tenant_id, dealer_id, user_id, tier, display_name, status,
                    hourly_sell_cap_mg, price_multiplier_bps, upkeep_due_at,
                    chip_remainder_units, pending_chips, pending_mg,
                    lifetime_sold_mg, last_sold_at, hired_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    dealer.tenant_id.as_str(),
                    dealer.dealer_id.as_str(),
                    dealer.user_id.as_str(),
                    i64::from(dealer.tier),
                    dealer.display_name.as_deref(),
                    dealer.status.as_str(),
                    to_i64(dealer.hourly_sell_cap_mg),
                    to_i64(dealer.price_multiplier_bps),
                    to_i64(dealer.upkeep_due_at),
                    to_i64(dealer.chip_remainder_units),
                    to_i64(dealer.pending_chips),
                    to_i64(dealer.pending_mg),
                    to_i64(dealer.lifetime_sold_mg),
                    to_i64(dealer.last_sold_at),
                    to_i64(dealer.hired_at),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn list_dealers(&mut self, tenant: &str) -> Result<Vec<Dealer>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {DEALER_COLUMNS} FROM cartel_dealers
                 WHERE tenant_id = ?1 ORDER BY dealer_id"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![tenant], dealer_from_row)
            .map_err(backend)?;
        let mut dealers = Vec::new();
        for row in rows {
            dealers.push(finish_dealer(row.map_err(backend)?)?);
        }
        Ok(dealers)
    }

    fn list_dealers_for_user(
        &mut self,
        tenant: &str,
        user: &str,
    ) -> Result<Vec<Dealer>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {DEALER_COLUMNS} FROM cartel_dealers
                 WHERE tenant_id = ?1 AND user_id = ?2 ORDER BY dealer_id"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![tenant, user], dealer_from_row)
            .map_err(backend)?;
        let mut dealers = Vec::new();
        for row in rows {
            dealers.push(finish_dealer(row.map_err(backend)?)?);
        }
        Ok(dealers)
    }

    fn dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<Option<Dealer>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {DEALER_COLUMNS} FROM cartel_dealers
                     WHERE tenant_id = ?1 AND dealer_id = ?2"
                ),
                params![tenant, dealer_id],
                dealer_from_row,
            )
            .optional()
            .map_err(backend)?;
        row.map(finish_dealer).transpose()
    }

    fn set_dealer_status(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        status: DealerStatus,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_dealers SET status = ?3
                 WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![tenant, dealer_id, status.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn set_dealer_upkeep(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        upkeep_due_at: u64,
        status: DealerStatus,
    ) -> Result<Option<Dealer>, StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_dealers SET upkeep_due_at = ?3, status = ?4
                 WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![tenant, dealer_id, to_i64(upkeep_due_at), status.as_str()],
            )
            .map_err(backend)?;
        self.dealer(tenant, dealer_id)
    }

    fn record_dealer_sale(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        mg_sold: u64,
        sold_at: u64,
        chip_remainder_units: u64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_dealers
                 SET lifetime_sold_mg = lifetime_sold_mg + ?3,
                     last_sold_at = ?4,
                     chip_remainder_units = ?5
                 WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![
                    tenant,
                    dealer_id,
                    to_i64(mg_sold),
                    to_i64(sold_at),
                    to_i64(chip_remainder_units),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn add_dealer_pending(
        &mut self,
        tenant: &str,
        dealer_id: &str,
        chips: u64,
        mg: u64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_dealers
                 SET pending_chips = pending_chips + ?3, pending_mg = pending_mg + ?4
                 WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![tenant, dealer_id, to_i64(chips), to_i64(mg)],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn clear_dealer_pending(
        &mut self,
        tenant: &str,
        entries: &[PendingClear],
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        for entry in entries {
            tx.execute(
                "UPDATE cartel_dealers
                 SET pending_chips = MAX(0, pending_chips - ?3),
                     pending_mg = MAX(0, pending_mg - ?4)
                 WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![
                    tenant,
                    entry.dealer_id.as_str(),
                    to_i64(entry.chips),
                    to_i64(entry.mg),
                ],
            )
            .map_err(backend)?;
        }
        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn delete_dealer(&mut self, tenant: &str, dealer_id: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM cartel_dealers WHERE tenant_id = ?1 AND dealer_id = ?2",
                params![tenant, dealer_id],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn delete_dealers_for_user(&mut self, tenant: &str, user: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM cartel_dealers WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn create_order(&mut self, order: &MarketOrder) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO cartel_market_orders (
                    tenant_id, order_id, user_id, side, shares,
                    price_per_share, status, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    order.tenant_id.as_str(),
                    order.order_id.as_str(),
                    order.user_id.as_str(),
                    order.side.as_str(),
                    to_i64(order.shares),
                    to_i64(order.price_per_share),
                    order.status.as_str(),
                    to_i64(order.created_at),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn list_orders(
        &mut self,
        tenant: &str,
        side: OrderSide,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError> {
        let direction = match side {
            OrderSide::Sell => "ASC",
            OrderSide::Buy => "DESC",
        };
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM cartel_market_orders
                 WHERE tenant_id = ?1 AND side = ?2 AND status = 'OPEN'
                 ORDER BY price_per_share {direction}, created_at ASC, order_id ASC
                 LIMIT ?3"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(
                params![tenant, side.as_str(), to_i64(limit as u64)],
                order_from_row,
            )
            .map_err(backend)?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(finish_order(row.map_err(backend)?)?);
        }
        Ok(orders)
    }

    fn list_orders_for_user(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<MarketOrder>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {ORDER_COLUMNS} FROM cartel_market_orders
                 WHERE tenant_id = ?1 AND user_id = ?2 AND status = 'OPEN'
                 ORDER BY created_at DESC, order_id ASC
                 LIMIT ?3"
            ))
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![tenant, user, to_i64(limit as u64)], order_from_row)
            .map_err(backend)?;
        let mut orders = Vec::new();
        for row in rows {
            orders.push(finish_order(row.map_err(backend)?)?);
        }
        Ok(orders)
    }

    fn order(&mut self, tenant: &str, order_id: &str) -> Result<Option<MarketOrder>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ORDER_COLUMNS} FROM cartel_market_orders
                     WHERE tenant_id = ?1 AND order_id = ?2"
                ),
                params![tenant, order_id],
                order_from_row,
            )
            .optional()
            .map_err(backend)?;
        row.map(finish_order).transpose()
    }

    fn set_order_status(
        &mut self,
        tenant: &str,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_market_orders SET status = ?3
                 WHERE tenant_id = ?1 AND order_id = ?2",
                params![tenant, order_id, status.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn set_order_shares(
        &mut self,
        tenant: &str,
        order_id: &str,
        shares: u64,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE cartel_market_orders SET shares = ?3, status = ?4
                 WHERE tenant_id = ?1 AND order_id = ?2",
                params![tenant, order_id, to_i64(shares), status.as_str()],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn record_transaction(&mut self, record: &TransactionRecord) -> Result<(), StoreError> {
        let detail_json = serde_json::to_string(&record.detail).map_err(backend)?;
        self.conn
            .execute(
                "INSERT INTO cartel_transactions (
                    tenant_id, user_id, kind, chips, mg, detail_json, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.tenant_id.as_str(),
                    record.user_id.as_str(),
                    record.kind.as_str(),
                    to_i64(record.chips),
                    to_i64(record.mg),
                    detail_json,
                    to_i64(record.created_at),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn list_transactions(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT tenant_id, user_id, kind, chips, mg, detail_json, created_at
                 FROM cartel_transactions
                 WHERE tenant_id = ?1 AND user_id = ?2
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![tenant, user, to_i64(limit as u64)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(backend)?;
        let mut records = Vec::new();
        for row in rows {
            let (tenant_id, user_id, kind_raw, chips, mg, detail_json, created_at) =
                row.map_err(backend)?;
            let kind = TransactionKind::parse(&kind_raw)
                .ok_or_else(|| StoreError::Backend(format!("unknown kind {kind_raw:?}")))?;
            let detail = serde_json::from_str(&detail_json).map_err(backend)?;
            records.push(TransactionRecord {
                tenant_id,
                user_id,
                kind,
                chips: to_u64(chips),
                mg: to_u64(mg),
                detail,
                created_at: to_u64(created_at),
            });
        }
        Ok(records)
    }
}

impl Ledger for SqliteStore {
    fn transfer_user_to_house(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        _reason: &str,
    ) -> Result<(), LedgerError> {
        let tx = self.conn.transaction().map_err(ledger_backend)?;
        let balance: Option<i64> = tx
            .query_row(
                "SELECT chips FROM user_balances WHERE tenant_id = ?1 AND user_id = ?2",
                params![tenant, user],
                |row| row.get(0),
            )
            .optional()
            .map_err(ledger_backend)?;
        if balance.map(to_u64).unwrap_or(0) < chips {
            return Err(LedgerError::InsufficientUser);
        }
        tx.execute(
            "UPDATE user_balances SET chips = chips - ?3
             WHERE tenant_id = ?1 AND user_id = ?2",
            params![tenant, user, to_i64(chips)],
        )
        .map_err(ledger_backend)?;
        tx.execute(
            "INSERT INTO house_balances (tenant_id, chips) VALUES (?1, ?2)
             ON CONFLICT(tenant_id) DO UPDATE SET chips = chips + excluded.chips",
            params![tenant, to_i64(chips)],
        )
        .map_err(ledger_backend)?;
        tx.commit().map_err(ledger_backend)?;
        Ok(())
    }

    fn transfer_house_to_user(
        &mut self,
        tenant: &str,
        user: &str,
        chips: u64,
        _reason: &str,
    ) -> Result<(), LedgerError> {
        let tx = self.conn.transaction().map_err(ledger_backend)?;
        let balance: Option<i64> = tx
            .query_row(
                "SELECT chips FROM house_balances WHERE tenant_id = ?1",
                params![tenant],
                |row| row.get(0),
            )
            .optional()
            .map_err(ledger_backend)?;
        if balance.map(to_u64).unwrap_or(0) < chips {
            return Err(LedgerError::InsufficientHouse);
        }
        tx.execute(
            "UPDATE house_balances SET chips = chips - ?2 WHERE tenant_id = ?1",
            params![tenant, to_i64(chips)],
        )
        .map_err(ledger_backend)?;
        tx.execute(
            "INSERT INTO user_balances (tenant_id, user_id, chips) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, user_id) DO UPDATE SET chips = chips + excluded.chips",
            params![tenant, user, to_i64(chips)],
        )
        .map_err(ledger_backend)?;
        tx.commit().map_err(ledger_backend)?;
        Ok(())
    }
}
