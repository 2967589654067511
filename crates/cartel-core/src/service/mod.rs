//! The cartel service: every player-facing and scheduled operation, bound
//! to a `Store` + `Ledger` implementation chosen at startup.
//!
//! Operations re-read live state immediately before mutating it and keep
//! the multi-step financial invariants: debits happen before credits, and
//! partial mutations roll back before an insufficiency error surfaces.

pub mod dealers;
pub mod market;
pub mod production;
pub mod stash;

use serde_json::{json, Value};

use contracts::{
    Investor, Overview, OverviewMetrics, Pool, PoolTotals, TransactionKind, TransactionRecord,
    DivestReceipt, InvestReceipt, MG_PER_GRAM,
};

use crate::config::CartelConfig;
use crate::error::CartelError;
use crate::ledger::Ledger;
use crate::progression::{apply_rank_progress, stash_cap_mg_for_rank, xp_to_next_for_rank, RankProgress};
use crate::store::Store;

pub use production::investor_weight;

pub struct Cartel<S> {
    store: S,
    config: CartelConfig,
}

impl<S> Cartel<S> {
    pub fn new(store: S, config: CartelConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CartelConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// `floor(chips * bps / 10_000)` permanent sale bonus.
pub(crate) fn sale_bonus_chips(chips: u64, multiplier_bps: u64) -> u64 {
    ((chips as u128 * multiplier_bps as u128) / 10_000) as u64
}

/// XP for an mg quantity at a milli-XP-per-gram rate, floored.
pub(crate) fn xp_for_mg(mg: u64, milli_per_gram: u64) -> u64 {
    ((mg as u128 * milli_per_gram as u128) / (MG_PER_GRAM as u128 * 1_000)) as u64
}

impl<S: Store + Ledger> Cartel<S> {
    /// Loads the tenant pool, creating it from configured defaults on first
    /// touch so the tenant becomes visible to the tick sweep.
    pub(crate) fn pool_or_default(&mut self, tenant: &str) -> Result<Pool, CartelError> {
        if let Some(pool) = self.store.pool(tenant)? {
            return Ok(pool);
        }
        let pool = Pool {
            tenant_id: tenant.to_string(),
            share_price_chips: self.config.share_price_chips,
            share_rate_mg_per_hour: self.config.share_rate_mg_per_hour,
            xp_per_gram_sold_milli: self.config.sale_xp_milli_per_gram,
            last_tick_at: 0,
            carryover_mg: 0,
        };
        self.store.upsert_pool(&pool)?;
        Ok(pool)
    }

    /// Reads an investor and normalizes stored rank state with a zero-gain
    /// progression pass (stored XP may exceed the current threshold after a
    /// curve change).
    pub(crate) fn normalized_investor(
        &mut self,
        tenant: &str,
        user: &str,
    ) -> Result<Investor, CartelError> {
        let mut investor = self.store.investor(tenant, user)?;
        let normalized = apply_rank_progress(investor.rank, investor.rank_xp, 0);
        if normalized.rank != investor.rank || normalized.rank_xp != investor.rank_xp {
            self.store
                .set_rank_and_xp(tenant, user, normalized.rank, normalized.rank_xp)?;
            investor.rank = normalized.rank;
            investor.rank_xp = normalized.rank_xp;
        }
        Ok(investor)
    }

    pub(crate) fn apply_xp_gain(
        &mut self,
        tenant: &str,
        investor: &Investor,
        xp_gain: u64,
    ) -> Result<RankProgress, CartelError> {
        let current = RankProgress {
            rank: investor.rank,
            rank_xp: investor.rank_xp,
        };
        if xp_gain == 0 {
            return Ok(current);
        }
        let progressed = apply_rank_progress(investor.rank, investor.rank_xp, xp_gain);
        if progressed != current {
            self.store
                .set_rank_and_xp(tenant, &investor.user_id, progressed.rank, progressed.rank_xp)?;
        }
        Ok(progressed)
    }

    pub(crate) fn record(
        &mut self,
        tenant: &str,
        user: &str,
        kind: TransactionKind,
        chips: u64,
        mg: u64,
        detail: Value,
        now: u64,
    ) -> Result<(), CartelError> {
        self.store.record_transaction(&TransactionRecord {
            tenant_id: tenant.to_string(),
            user_id: user.to_string(),
            kind,
            chips,
            mg,
            detail,
            created_at: now,
        })?;
        Ok(())
    }

    pub fn overview(&mut self, tenant: &str, user: &str) -> Result<Overview, CartelError> {
        let pool = self.pool_or_default(tenant)?;
        let investors = self.store.list_investors(tenant)?;
        let investor = self.normalized_investor(tenant, user)?;

        let total_shares: u64 = investors.iter().map(|inv| inv.shares).sum();
        let totals = PoolTotals {
            shares: total_shares,
            stash_mg: investors.iter().map(|inv| inv.stash_mg).sum(),
            warehouse_mg: investors.iter().map(|inv| inv.warehouse_mg).sum(),
            investors: investors.len(),
        };
        let active_investors = investors
            .iter()
            .filter(|inv| investor_weight(inv.shares, inv.rank, total_shares) > 0)
            .count();

        let shares = investor.shares;
        let share_percent_bps = if total_shares > 0 && shares > 0 {
            shares * 10_000 / total_shares
        } else {
            0
        };
        // Same shape as the tick weight, with the per-share rate folded in
        // before the single floor.
        let hourly_production_mg = if shares > 0 {
            let denominator = shares.max(total_shares) as u128;
            let numerator = shares as u128
                * pool.share_rate_mg_per_hour as u128
                * investor.rank as u128
                * (denominator + shares as u128);
            (numerator / denominator) as u64
        } else {
            0
        };

        let next_tick_at = if pool.last_tick_at > 0 {
            Some(pool.last_tick_at + self.config.min_tick_interval_seconds)
        } else {
            None
        };

        let metrics = OverviewMetrics {
            hourly_production_mg,
            daily_production_mg: hourly_production_mg * 24,
            stash_cap_mg: stash_cap_mg_for_rank(investor.rank),
            share_percent_bps,
            active_investors,
            share_price_chips: pool.share_price_chips,
            share_rate_mg_per_hour: pool.share_rate_mg_per_hour,
            xp_per_gram_sold_milli: pool.xp_per_gram_sold_milli,
            sale_multiplier_bps: investor.sale_multiplier_bps,
            xp_to_next_rank: xp_to_next_for_rank(investor.rank),
        };

        Ok(Overview {
            pool,
            investor,
            totals,
            metrics,
            next_tick_at,
        })
    }

    /// Buys whole shares; only the spent amount (`shares * price`) is
    /// debited, the remainder stays with the caller.
    pub fn invest(
        &mut self,
        tenant: &str,
        user: &str,
        chips_offered: u64,
        now: u64,
    ) -> Result<InvestReceipt, CartelError> {
        let pool = self.pool_or_default(tenant)?;
        let share_price = pool.share_price_chips.max(1);
        let shares = chips_offered / share_price;
        if shares == 0 {
            return Err(CartelError::InvestBelowMinimum { share_price });
        }
        let spend = shares * share_price;
        self.store
            .transfer_user_to_house(tenant, user, spend, "cartel investment")?;
        self.store.add_shares(tenant, user, shares)?;
        self.record(
            tenant,
            user,
            TransactionKind::Invest,
            spend,
            0,
            json!({ "shares": shares }),
            now,
        )?;
        Ok(InvestReceipt {
            shares,
            spend,
            remainder: chips_offered - spend,
            share_price,
        })
    }

    /// Sells shares back to the house at pool price. The share removal is
    /// rolled back if the house cannot cover the payout.
    pub fn divest(
        &mut self,
        tenant: &str,
        user: &str,
        shares_to_sell: u64,
        now: u64,
    ) -> Result<DivestReceipt, CartelError> {
        if shares_to_sell == 0 {
            return Err(CartelError::ShareAmountRequired);
        }
        let pool = self.pool_or_default(tenant)?;
        let share_price = pool.share_price_chips.max(1);
        let investor = self.normalized_investor(tenant, user)?;
        if investor.shares < shares_to_sell {
            return Err(CartelError::InsufficientShares);
        }
        self.store.remove_shares(tenant, user, shares_to_sell)?;
        let payout = shares_to_sell * share_price;
        if let Err(err) =
            self.store
                .transfer_house_to_user(tenant, user, payout, "cartel share sale")
        {
            // Best-effort restore; the investor must not lose shares on a
            // failed payout.
            let _ = self.store.add_shares(tenant, user, shares_to_sell);
            return Err(err.into());
        }
        self.record(
            tenant,
            user,
            TransactionKind::Divest,
            payout,
            0,
            json!({ "shares": shares_to_sell, "share_price": share_price }),
            now,
        )?;
        Ok(DivestReceipt {
            shares_sold: shares_to_sell,
            payout,
            share_price,
        })
    }

    pub fn history(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, CartelError> {
        Ok(self.store.list_transactions(tenant, user, limit)?)
    }

    // Admin setters. Values are validated here, at the edge.

    pub fn set_share_price(&mut self, tenant: &str, price: u64) -> Result<Pool, CartelError> {
        if price == 0 {
            return Err(CartelError::PriceInvalid);
        }
        let mut pool = self.pool_or_default(tenant)?;
        pool.share_price_chips = price;
        self.store.upsert_pool(&pool)?;
        Ok(pool)
    }

    pub fn set_share_rate(
        &mut self,
        tenant: &str,
        mg_per_hour: u64,
    ) -> Result<Pool, CartelError> {
        if mg_per_hour == 0 {
            return Err(CartelError::RateInvalid);
        }
        let mut pool = self.pool_or_default(tenant)?;
        pool.share_rate_mg_per_hour = mg_per_hour;
        self.store.upsert_pool(&pool)?;
        Ok(pool)
    }

    pub fn set_xp_per_gram(
        &mut self,
        tenant: &str,
        milli_per_gram: u64,
    ) -> Result<Pool, CartelError> {
        let mut pool = self.pool_or_default(tenant)?;
        pool.xp_per_gram_sold_milli = milli_per_gram;
        self.store.upsert_pool(&pool)?;
        Ok(pool)
    }

    /// Wipes an investor back to a fresh rank-1 profile and releases their
    /// dealers.
    pub fn reset_investor(&mut self, tenant: &str, user: &str) -> Result<(), CartelError> {
        self.store.delete_dealers_for_user(tenant, user)?;
        self.store.reset_investor(tenant, user)?;
        Ok(())
    }
}
