//! Periodic production tick: weight computation, proportional allocation
//! with a last-investor remainder tie-break, stash overflow, and XP award.

use contracts::{
    Investor, Pool, ProductionAllocation, SweepReport, TenantTickFailure, TenantTickReport,
    TickOutcome, TickSkipReason, SECONDS_PER_HOUR,
};

use crate::error::CartelError;
use crate::ledger::Ledger;
use crate::progression::{apply_rank_progress, stash_cap_mg_for_rank};
use crate::service::{xp_for_mg, Cartel};
use crate::store::Store;

/// An investor's production weight for one tick: stake scaled by rank and
/// by proportional ownership, floored once.
///
/// `shares * (1 + shares/denom) * rank` with `denom = max(shares,
/// total_shares)`, computed as a single integer expression so no
/// intermediate rounding leaks in. The denominator guard covers the sole
/// holder whose shares exceed the recorded total.
pub fn investor_weight(shares: u64, rank: u32, total_shares: u64) -> u64 {
    if shares == 0 {
        return 0;
    }
    let rank = rank.max(1) as u128;
    let shares = shares as u128;
    let denominator = shares.max(total_shares as u128);
    ((shares * rank * (denominator + shares)) / denominator) as u64
}

struct WeightedInvestor {
    investor: Investor,
    weight: u64,
}

struct TenantState {
    pool: Pool,
    active: Vec<WeightedInvestor>,
    total_weight: u64,
}

impl<S: Store + Ledger> Cartel<S> {
    fn load_tenant_state(&mut self, tenant: &str) -> Result<TenantState, CartelError> {
        let pool = self.pool_or_default(tenant)?;
        let investors = self.store_mut().list_investors(tenant)?;
        let total_shares: u64 = investors.iter().map(|inv| inv.shares).sum();
        let active: Vec<WeightedInvestor> = investors
            .into_iter()
            .filter(|inv| inv.shares > 0)
            .filter_map(|investor| {
                let weight = investor_weight(investor.shares, investor.rank, total_shares);
                (weight > 0).then_some(WeightedInvestor { investor, weight })
            })
            .collect();
        let total_weight = active.iter().map(|entry| entry.weight).sum();
        Ok(TenantState {
            pool,
            active,
            total_weight,
        })
    }

    /// Runs the production tick for one tenant, or for every known tenant
    /// when `tenant` is `None`. A failing tenant never aborts the sweep;
    /// its error is reported alongside the successful outcomes.
    pub fn run_production_tick(
        &mut self,
        tenant: Option<&str>,
        now: u64,
    ) -> Result<SweepReport, CartelError> {
        let mut report = SweepReport::default();
        let tenants = match tenant {
            Some(tenant) => vec![tenant.to_string()],
            None => self.store_mut().list_tenants()?,
        };
        for tenant_id in tenants {
            match self.run_tick_for_tenant(&tenant_id, now) {
                Ok(outcome) => report.reports.push(TenantTickReport {
                    tenant_id,
                    outcome,
                }),
                Err(err) if tenant.is_some() => return Err(err),
                Err(err) => report.failures.push(TenantTickFailure {
                    tenant_id,
                    error: err.to_string(),
                }),
            }
        }
        Ok(report)
    }

    fn run_tick_for_tenant(&mut self, tenant: &str, now: u64) -> Result<TickOutcome, CartelError> {
        let state = self.load_tenant_state(tenant)?;
        let pool = &state.pool;

        let last_tick = pool.last_tick_at;
        if last_tick > 0
            && now.saturating_sub(last_tick) < self.config().min_tick_interval_seconds
        {
            return Ok(TickOutcome::Skipped {
                reason: TickSkipReason::Interval,
            });
        }

        if state.active.is_empty() || state.total_weight == 0 {
            // Advance the clock anyway so the tenant is not starved once
            // investors appear.
            self.store_mut()
                .update_pool_tick(tenant, now, pool.carryover_mg)?;
            return Ok(TickOutcome::Skipped {
                reason: TickSkipReason::NoInvestors,
            });
        }

        let delta_seconds = if last_tick > 0 {
            now.saturating_sub(last_tick)
        } else {
            self.config().min_tick_interval_seconds
        };

        let produced_mg = (state.total_weight as u128
            * pool.share_rate_mg_per_hour as u128
            * delta_seconds as u128
            / SECONDS_PER_HOUR as u128) as u64;
        let available_mg = produced_mg + pool.carryover_mg;
        if available_mg == 0 {
            self.store_mut().update_pool_tick(tenant, now, 0)?;
            return Ok(TickOutcome::Skipped {
                reason: TickSkipReason::NoOutput,
            });
        }

        let total_weight = state.total_weight;
        let last_index = state.active.len() - 1;
        let mut assigned_mg = 0_u64;
        let mut allocations = Vec::with_capacity(state.active.len());
        for (idx, entry) in state.active.iter().enumerate() {
            // Floor division per investor; the final investor takes the
            // exact remainder so nothing is dropped to rounding.
            let mg_share = if idx == last_index {
                available_mg - assigned_mg
            } else {
                ((available_mg as u128 * entry.weight as u128) / total_weight as u128) as u64
            };
            assigned_mg += mg_share;

            let investor = &entry.investor;
            let cap_mg = stash_cap_mg_for_rank(investor.rank);
            let target_stash = investor.stash_mg + mg_share;
            let (stash_mg, overflow_mg) = if target_stash > cap_mg {
                (cap_mg, target_stash - cap_mg)
            } else {
                (target_stash, 0)
            };

            let xp_gain = xp_for_mg(mg_share, self.config().production_xp_milli_per_gram);
            let progressed = apply_rank_progress(investor.rank, investor.rank_xp, xp_gain);

            allocations.push(ProductionAllocation {
                user_id: investor.user_id.clone(),
                allocated_mg: mg_share,
                stash_mg,
                warehouse_mg: investor.warehouse_mg + overflow_mg,
                rank: progressed.rank,
                rank_xp: progressed.rank_xp,
            });
        }
        let carryover_mg = available_mg - assigned_mg;

        self.store_mut()
            .apply_production(tenant, &allocations, now, carryover_mg)?;

        let sweep = self.run_dealer_automation(tenant, now, delta_seconds)?;

        Ok(TickOutcome::Produced {
            investors_processed: allocations.len(),
            distributed_mg: assigned_mg,
            carryover_mg,
            delta_seconds,
            dealer_sales: sweep.sales,
        })
    }
}
