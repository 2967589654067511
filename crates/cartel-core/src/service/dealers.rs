//! Dealer lifecycle and per-tick automation: upkeep billing with pause on
//! insolvency, and bounded autosale with lossless fixed-point payout carry.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use contracts::{
    Dealer, DealerCollectReceipt, DealerStatus, DealerSweep, Investor, TransactionKind,
    UpkeepReceipt, CHIP_VALUE_UNITS, SECONDS_PER_HOUR,
};

use crate::error::CartelError;
use crate::ledger::{Ledger, LedgerError};
use crate::service::{xp_for_mg, Cartel};
use crate::store::{PendingClear, Store};
use crate::tiers::{dealer_cap_for_rank, dealer_tier, DealerTier};

/// Floor on how far an auto-charge can push the next upkeep due time.
const MIN_UPKEEP_ADVANCE_SECONDS: u64 = 60;

/// Fallback when a stored tier id no longer maps to the catalog.
const FALLBACK_UPKEEP_PERCENT_BPS: u64 = 5_000;

/// Gross hourly revenue in chip value units (`mg * chips/gram * bps`).
pub fn hourly_revenue_units(cap_mg: u64, price_per_gram: u64, multiplier_bps: u64) -> u128 {
    cap_mg as u128 * price_per_gram as u128 * multiplier_bps.max(1) as u128
}

/// Hourly upkeep in chip value units: the tier's percentage of revenue.
pub fn upkeep_units_per_hour(
    cap_mg: u64,
    price_per_gram: u64,
    multiplier_bps: u64,
    upkeep_percent_bps: u64,
) -> u128 {
    hourly_revenue_units(cap_mg, price_per_gram, multiplier_bps) * upkeep_percent_bps as u128
        / 10_000
}

/// Hourly upkeep rounded to whole chips (used for the automatic charge).
pub fn upkeep_chips_per_hour(units_per_hour: u128) -> u64 {
    ((units_per_hour + CHIP_VALUE_UNITS as u128 / 2) / CHIP_VALUE_UNITS as u128) as u64
}

/// How many seconds of upkeep a chip payment buys, floored. Zero when the
/// dealer has no upkeep cost to meter against.
pub fn upkeep_seconds_purchased(units_per_hour: u128, chips: u64) -> u64 {
    if units_per_hour == 0 {
        return 0;
    }
    (chips as u128 * SECONDS_PER_HOUR as u128 * CHIP_VALUE_UNITS as u128 / units_per_hour) as u64
}

/// Smallest chip payment that buys at least one second of upkeep.
pub fn minimum_upkeep_chips(units_per_hour: u128) -> u64 {
    if units_per_hour == 0 {
        return 0;
    }
    let denominator = SECONDS_PER_HOUR as u128 * CHIP_VALUE_UNITS as u128;
    (units_per_hour.div_ceil(denominator) as u64).max(1)
}

/// Dealer price multiplier compounded with the owner's permanent sale bonus.
pub fn combined_multiplier_bps(dealer_bps: u64, sale_bps: u64) -> u64 {
    (dealer_bps.max(1) as u128 * (10_000 + sale_bps as u128) / 10_000) as u64
}

fn dealer_upkeep_units(dealer: &Dealer, price_per_gram: u64) -> u128 {
    let upkeep_percent_bps = dealer_tier(dealer.tier)
        .map(|tier| tier.upkeep_percent_bps)
        .unwrap_or(FALLBACK_UPKEEP_PERCENT_BPS);
    upkeep_units_per_hour(
        dealer.hourly_sell_cap_mg,
        price_per_gram,
        dealer.price_multiplier_bps,
        upkeep_percent_bps,
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct DealerListing {
    pub dealer: Dealer,
    pub tier: Option<DealerTier>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FireAllReceipt {
    pub count: usize,
    pub dealers: Vec<Dealer>,
}

impl<S: Store + Ledger> Cartel<S> {
    /// One automation pass over a tenant's dealers. Upkeep is billed first;
    /// a dealer that cannot pay pauses instead of selling. Sales drain the
    /// owner's stash into the dealer's pending balances.
    pub fn run_dealer_automation(
        &mut self,
        tenant: &str,
        now: u64,
        delta_seconds: u64,
    ) -> Result<DealerSweep, CartelError> {
        let dealers = self.store_mut().list_dealers(tenant)?;
        if dealers.is_empty() {
            return Ok(DealerSweep::default());
        }
        let investors = self.store_mut().list_investors(tenant)?;
        let mut investor_map: BTreeMap<String, Investor> = investors
            .into_iter()
            .map(|inv| (inv.user_id.clone(), inv))
            .collect();

        let price_per_gram = self.config().base_price_per_gram;
        let interval_seconds = delta_seconds.max(1);
        let mut sweep = DealerSweep {
            processed: dealers.len(),
            sales: 0,
        };

        for mut dealer in dealers {
            if dealer.status != DealerStatus::Active {
                continue;
            }
            let Some(investor) = investor_map.get_mut(&dealer.user_id) else {
                continue;
            };

            if dealer.upkeep_due_at > 0 && now >= dealer.upkeep_due_at {
                let units_per_hour = dealer_upkeep_units(&dealer, price_per_gram);
                let auto_chips = upkeep_chips_per_hour(units_per_hour).max(1);
                let auto_seconds = upkeep_seconds_purchased(units_per_hour, auto_chips);
                if auto_seconds == 0 {
                    self.store_mut().set_dealer_status(
                        tenant,
                        &dealer.dealer_id,
                        DealerStatus::Paused,
                    )?;
                    continue;
                }
                match self.store_mut().transfer_user_to_house(
                    tenant,
                    &dealer.user_id,
                    auto_chips,
                    "cartel dealer upkeep (auto)",
                ) {
                    Ok(()) => {
                        let next_due = now + auto_seconds.max(MIN_UPKEEP_ADVANCE_SECONDS);
                        self.store_mut().set_dealer_upkeep(
                            tenant,
                            &dealer.dealer_id,
                            next_due,
                            DealerStatus::Active,
                        )?;
                        dealer.upkeep_due_at = next_due;
                        let user_id = dealer.user_id.clone();
                        self.record(
                            tenant,
                            &user_id,
                            TransactionKind::DealerUpkeepAuto,
                            auto_chips,
                            0,
                            json!({
                                "dealer_id": dealer.dealer_id,
                                "seconds_purchased": auto_seconds,
                            }),
                            now,
                        )?;
                    }
                    Err(LedgerError::InsufficientUser) => {
                        self.store_mut().set_dealer_status(
                            tenant,
                            &dealer.dealer_id,
                            DealerStatus::Paused,
                        )?;
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            let stash_mg = investor.stash_mg;
            if stash_mg == 0 {
                continue;
            }
            let tick_quota_mg = (dealer.hourly_sell_cap_mg as u128 * interval_seconds as u128
                / SECONDS_PER_HOUR as u128) as u64;
            if tick_quota_mg == 0 {
                continue;
            }
            let mg_to_sell = stash_mg.min(tick_quota_mg);

            let effective_bps =
                combined_multiplier_bps(dealer.price_multiplier_bps, investor.sale_multiplier_bps);
            let sale_value_units =
                mg_to_sell as u128 * price_per_gram as u128 * effective_bps as u128;
            let total_units = dealer.chip_remainder_units as u128 + sale_value_units;
            let payout_chips = (total_units / CHIP_VALUE_UNITS as u128) as u64;
            let next_remainder_units = (total_units % CHIP_VALUE_UNITS as u128) as u64;

            let new_stash = stash_mg - mg_to_sell;
            investor.stash_mg = new_stash;
            let warehouse_mg = investor.warehouse_mg;
            let user_id = dealer.user_id.clone();
            self.store_mut()
                .set_holdings(tenant, &user_id, new_stash, warehouse_mg)?;
            self.store_mut().record_dealer_sale(
                tenant,
                &dealer.dealer_id,
                mg_to_sell,
                now,
                next_remainder_units,
            )?;
            self.store_mut()
                .add_dealer_pending(tenant, &dealer.dealer_id, payout_chips, mg_to_sell)?;
            self.record(
                tenant,
                &user_id,
                TransactionKind::DealerSalePending,
                payout_chips,
                mg_to_sell,
                json!({ "dealer_id": dealer.dealer_id }),
                now,
            )?;
            sweep.sales += 1;
        }
        Ok(sweep)
    }

    pub fn hire_dealer(
        &mut self,
        tenant: &str,
        user: &str,
        tier_id: u8,
        display_name: Option<String>,
        now: u64,
    ) -> Result<Dealer, CartelError> {
        let investor = self.normalized_investor(tenant, user)?;
        let tier = dealer_tier(tier_id).ok_or(CartelError::InvalidTier)?;
        if investor.rank < tier.required_rank {
            return Err(CartelError::RankTooLow {
                required_rank: tier.required_rank,
                tier_name: tier.name,
            });
        }
        let cap = dealer_cap_for_rank(investor.rank);
        let existing = self.store_mut().list_dealers_for_user(tenant, user)?;
        if existing.len() >= cap {
            return Err(CartelError::DealerCap {
                rank: investor.rank,
                cap,
            });
        }
        self.store_mut().transfer_user_to_house(
            tenant,
            user,
            tier.hire_cost,
            "cartel dealer hire",
        )?;
        let dealer = Dealer {
            tenant_id: tenant.to_string(),
            dealer_id: Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            tier: tier.id,
            display_name: display_name
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            status: DealerStatus::Active,
            hourly_sell_cap_mg: tier.hourly_sell_cap_mg,
            price_multiplier_bps: tier.price_multiplier_bps,
            upkeep_due_at: now + tier.upkeep_interval_seconds,
            chip_remainder_units: 0,
            pending_chips: 0,
            pending_mg: 0,
            lifetime_sold_mg: 0,
            last_sold_at: 0,
            hired_at: now,
        };
        self.store_mut().create_dealer(&dealer)?;
        self.record(
            tenant,
            user,
            TransactionKind::DealerHire,
            tier.hire_cost,
            0,
            json!({
                "dealer_id": dealer.dealer_id,
                "tier": tier.id,
                "name": tier.name,
                "contact_name": dealer.display_name,
            }),
            now,
        )?;
        Ok(dealer)
    }

    /// Buys upkeep time for one dealer. Time extends from whichever is
    /// later: now, or the currently paid-through moment.
    pub fn pay_dealer_upkeep(
        &mut self,
        tenant: &str,
        user: &str,
        dealer_id: &str,
        chips: u64,
        now: u64,
    ) -> Result<UpkeepReceipt, CartelError> {
        let dealer = self
            .store_mut()
            .dealer(tenant, dealer_id)?
            .filter(|dealer| dealer.user_id == user)
            .ok_or(CartelError::DealerNotFound)?;
        if chips == 0 {
            return Err(CartelError::UpkeepAmountRequired);
        }
        let units_per_hour = dealer_upkeep_units(&dealer, self.config().base_price_per_gram);
        let seconds_purchased = upkeep_seconds_purchased(units_per_hour, chips);
        if seconds_purchased == 0 {
            return Err(CartelError::UpkeepTooLow {
                minimum_chips: minimum_upkeep_chips(units_per_hour),
            });
        }
        self.store_mut()
            .transfer_user_to_house(tenant, user, chips, "cartel dealer upkeep")?;
        let base_due = dealer.upkeep_due_at.max(now);
        let next_due = base_due + seconds_purchased;
        self.record(
            tenant,
            user,
            TransactionKind::DealerUpkeep,
            chips,
            0,
            json!({ "dealer_id": dealer_id, "seconds_purchased": seconds_purchased }),
            now,
        )?;
        let updated = self
            .store_mut()
            .set_dealer_upkeep(tenant, dealer_id, next_due, DealerStatus::Active)?
            .ok_or(CartelError::DealerNotFound)?;
        Ok(UpkeepReceipt {
            dealer: updated,
            seconds_purchased,
            chips_spent: chips,
        })
    }

    /// Deletes a dealer. No refund; pending chips on the dealer are
    /// forfeited.
    pub fn fire_dealer(
        &mut self,
        tenant: &str,
        user: &str,
        dealer_id: &str,
        now: u64,
    ) -> Result<Dealer, CartelError> {
        let dealer = self
            .store_mut()
            .dealer(tenant, dealer_id)?
            .filter(|dealer| dealer.user_id == user)
            .ok_or(CartelError::DealerNotFound)?;
        self.store_mut().delete_dealer(tenant, dealer_id)?;
        self.record(
            tenant,
            user,
            TransactionKind::DealerFire,
            0,
            0,
            json!({
                "dealer_id": dealer_id,
                "tier": dealer.tier,
                "forfeited_chips": dealer.pending_chips,
                "contact_name": dealer.display_name,
            }),
            now,
        )?;
        Ok(dealer)
    }

    pub fn fire_all_dealers(
        &mut self,
        tenant: &str,
        user: &str,
        now: u64,
    ) -> Result<FireAllReceipt, CartelError> {
        let dealers = self.store_mut().list_dealers_for_user(tenant, user)?;
        if dealers.is_empty() {
            return Err(CartelError::NoDealers);
        }
        self.store_mut().delete_dealers_for_user(tenant, user)?;
        self.record(
            tenant,
            user,
            TransactionKind::DealerFireAll,
            0,
            0,
            json!({ "count": dealers.len() }),
            now,
        )?;
        Ok(FireAllReceipt {
            count: dealers.len(),
            dealers,
        })
    }

    /// Pays out every dealer's pending chips in one batch and awards the
    /// sale XP for the combined quantity once.
    pub fn collect_dealer_chips(
        &mut self,
        tenant: &str,
        user: &str,
        now: u64,
    ) -> Result<DealerCollectReceipt, CartelError> {
        let dealers = self.store_mut().list_dealers_for_user(tenant, user)?;
        let pending: Vec<PendingClear> = dealers
            .iter()
            .filter(|dealer| dealer.pending_chips > 0)
            .map(|dealer| PendingClear {
                dealer_id: dealer.dealer_id.clone(),
                chips: dealer.pending_chips,
                mg: dealer.pending_mg,
            })
            .collect();
        let total_chips: u64 = pending.iter().map(|entry| entry.chips).sum();
        let total_mg: u64 = pending.iter().map(|entry| entry.mg).sum();
        if total_chips == 0 {
            return Err(CartelError::NoDealerChips);
        }
        self.store_mut()
            .transfer_house_to_user(tenant, user, total_chips, "cartel dealer collect")?;
        self.store_mut().clear_dealer_pending(tenant, &pending)?;

        let pool = self.pool_or_default(tenant)?;
        let xp_gain = xp_for_mg(total_mg, pool.xp_per_gram_sold_milli);
        let progressed = if xp_gain > 0 {
            let investor = self.normalized_investor(tenant, user)?;
            self.apply_xp_gain(tenant, &investor, xp_gain)?
        } else {
            let investor = self.normalized_investor(tenant, user)?;
            crate::progression::RankProgress {
                rank: investor.rank,
                rank_xp: investor.rank_xp,
            }
        };
        self.record(
            tenant,
            user,
            TransactionKind::DealerCollect,
            total_chips,
            total_mg,
            json!({ "dealers": pending.len() }),
            now,
        )?;
        Ok(DealerCollectReceipt {
            total_chips,
            total_mg,
            xp_gain,
            dealers_collected: pending.len(),
            rank: progressed.rank,
            rank_xp: progressed.rank_xp,
        })
    }

    pub fn list_dealers(
        &mut self,
        tenant: &str,
        user: &str,
    ) -> Result<Vec<DealerListing>, CartelError> {
        let dealers = self.store_mut().list_dealers_for_user(tenant, user)?;
        Ok(dealers
            .into_iter()
            .map(|dealer| {
                let tier = dealer_tier(dealer.tier).copied();
                DealerListing { dealer, tier }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::DEALER_TIERS;

    #[test]
    fn lookout_upkeep_math_matches_catalog() {
        let tier = &DEALER_TIERS[0];
        // 5,000 mg/h at 3 chips/g and 0.8x price: 12 chips/h revenue,
        // upkeep 50% = 6 chips/h.
        let units = upkeep_units_per_hour(
            tier.hourly_sell_cap_mg,
            3,
            tier.price_multiplier_bps,
            tier.upkeep_percent_bps,
        );
        assert_eq!(upkeep_chips_per_hour(units), 6);
        assert_eq!(upkeep_seconds_purchased(units, 6), 3_600);
        assert_eq!(minimum_upkeep_chips(units), 1);
    }

    #[test]
    fn kingpin_upkeep_is_cheap_relative_to_revenue() {
        let tier = &DEALER_TIERS[5];
        // 400,000 mg/h at 3 chips/g and 1.25x: 1,500 chips/h revenue,
        // upkeep 3% = 45 chips/h.
        let units = upkeep_units_per_hour(
            tier.hourly_sell_cap_mg,
            3,
            tier.price_multiplier_bps,
            tier.upkeep_percent_bps,
        );
        assert_eq!(upkeep_chips_per_hour(units), 45);
        assert_eq!(upkeep_seconds_purchased(units, 45), 3_600);
    }

    #[test]
    fn seconds_purchased_floors_and_handles_zero_cost() {
        let units = upkeep_units_per_hour(10_000, 3, 10_000, 5_000);
        // 15 chips/h: one chip buys 240 seconds.
        assert_eq!(upkeep_seconds_purchased(units, 1), 240);
        assert_eq!(upkeep_seconds_purchased(0, 1_000), 0);
        assert_eq!(minimum_upkeep_chips(0), 0);
    }

    #[test]
    fn combined_multiplier_compounds_in_basis_points() {
        assert_eq!(combined_multiplier_bps(10_000, 0), 10_000);
        assert_eq!(combined_multiplier_bps(10_000, 500), 10_500);
        // 1.25x dealer with a 10% owner bonus: 13,750 bps.
        assert_eq!(combined_multiplier_bps(12_500, 1_000), 13_750);
        // Degenerate stored multiplier still floors at 1.
        assert_eq!(combined_multiplier_bps(0, 0), 1);
    }
}
