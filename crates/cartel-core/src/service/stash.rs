//! Stash and warehouse operations: selling to the street price, fee-gated
//! collection out of the warehouse, exporting for a permanent sale bonus,
//! and abandoning inventory.

use serde_json::json;

use contracts::{
    StashSaleReceipt, TransactionKind, WarehouseCollectReceipt, WarehouseExportReceipt,
    CHIP_VALUE_UNITS, MG_PER_GRAM,
};

use crate::error::CartelError;
use crate::ledger::Ledger;
use crate::progression::stash_cap_mg_for_rank;
use crate::service::{sale_bonus_chips, xp_for_mg, Cartel};
use crate::store::Store;

/// One full export unit (1,000 grams) buys 100 bps of permanent bonus.
const EXPORT_UNIT_MG: u64 = 1_000 * MG_PER_GRAM;
const EXPORT_BONUS_BPS_PER_UNIT: u64 = 100;

pub(crate) fn warehouse_export_bonus_bps(mg: u64) -> u64 {
    (mg / EXPORT_UNIT_MG) * EXPORT_BONUS_BPS_PER_UNIT
}

impl<S: Store + Ledger> Cartel<S> {
    /// Sells stash at the base street price plus the investor's permanent
    /// bonus. The stash debit is rolled back if the house cannot pay.
    pub fn sell_stash(
        &mut self,
        tenant: &str,
        user: &str,
        mg_to_sell: u64,
        now: u64,
    ) -> Result<StashSaleReceipt, CartelError> {
        if mg_to_sell == 0 {
            return Err(CartelError::AmountRequired);
        }
        let pool = self.pool_or_default(tenant)?;
        let investor = self.normalized_investor(tenant, user)?;
        if investor.stash_mg < mg_to_sell {
            return Err(CartelError::InsufficientStash);
        }
        let base_chips = ((mg_to_sell as u128 * self.config().base_price_per_gram as u128)
            / MG_PER_GRAM as u128) as u64;
        let bonus_chips = sale_bonus_chips(base_chips, investor.sale_multiplier_bps);
        let payout = base_chips + bonus_chips;

        let new_stash = investor.stash_mg - mg_to_sell;
        self.store_mut()
            .set_holdings(tenant, user, new_stash, investor.warehouse_mg)?;
        if let Err(err) =
            self.store_mut()
                .transfer_house_to_user(tenant, user, payout, "cartel sale")
        {
            // Restore the stash before surfacing; no resource is destroyed
            // by a failed payout.
            self.store_mut()
                .set_holdings(tenant, user, investor.stash_mg, investor.warehouse_mg)?;
            return Err(err.into());
        }

        let xp_gain = xp_for_mg(mg_to_sell, pool.xp_per_gram_sold_milli);
        let progressed = self.apply_xp_gain(tenant, &investor, xp_gain)?;
        self.record(
            tenant,
            user,
            TransactionKind::Sell,
            payout,
            mg_to_sell,
            json!({
                "price_per_gram": self.config().base_price_per_gram,
                "sale_multiplier_bps": investor.sale_multiplier_bps,
            }),
            now,
        )?;
        Ok(StashSaleReceipt {
            mg_sold: mg_to_sell,
            payout,
            bonus_chips,
            rank: progressed.rank,
            rank_xp: progressed.rank_xp,
        })
    }

    /// Moves warehouse inventory into the stash for a fee on its notional
    /// value. The fee is charged regardless of how much fits; overflow
    /// beyond the stash cap returns to the warehouse rather than burning.
    pub fn collect_warehouse(
        &mut self,
        tenant: &str,
        user: &str,
        mg_requested: u64,
        now: u64,
    ) -> Result<WarehouseCollectReceipt, CartelError> {
        if mg_requested == 0 {
            return Err(CartelError::AmountRequired);
        }
        let investor = self.store_mut().investor(tenant, user)?;
        if investor.warehouse_mg < mg_requested {
            return Err(CartelError::InsufficientWarehouse);
        }
        let fee_numerator = mg_requested as u128
            * self.config().base_price_per_gram as u128
            * self.config().warehouse_fee_bps as u128;
        let fee = fee_numerator.div_ceil(CHIP_VALUE_UNITS as u128) as u64;
        if fee > 0 {
            self.store_mut()
                .transfer_user_to_house(tenant, user, fee, "cartel warehouse fee")?;
        }
        let cap_mg = stash_cap_mg_for_rank(investor.rank);
        let target_stash = investor.stash_mg + mg_requested;
        let (final_stash, overflow) = if target_stash > cap_mg {
            (cap_mg, target_stash - cap_mg)
        } else {
            (target_stash, 0)
        };
        let new_warehouse = investor.warehouse_mg - mg_requested + overflow;
        self.store_mut()
            .set_holdings(tenant, user, final_stash, new_warehouse)?;
        self.record(
            tenant,
            user,
            TransactionKind::CollectFee,
            fee,
            mg_requested,
            json!({ "overflow_mg": overflow }),
            now,
        )?;
        Ok(WarehouseCollectReceipt {
            collected_mg: mg_requested - overflow,
            overflow_returned_mg: overflow,
            fee,
        })
    }

    /// Converts bulk warehouse inventory into a permanent sale multiplier
    /// increase. One-way: nothing comes back.
    pub fn export_warehouse(
        &mut self,
        tenant: &str,
        user: &str,
        mg_amount: Option<u64>,
        now: u64,
    ) -> Result<WarehouseExportReceipt, CartelError> {
        let investor = self.store_mut().investor(tenant, user)?;
        if investor.warehouse_mg == 0 {
            return Err(CartelError::InsufficientWarehouse);
        }
        let mg_to_export = mg_amount.unwrap_or(investor.warehouse_mg);
        if mg_to_export == 0 {
            return Err(CartelError::AmountRequired);
        }
        if mg_to_export > investor.warehouse_mg {
            return Err(CartelError::InsufficientWarehouse);
        }
        self.store_mut().set_holdings(
            tenant,
            user,
            investor.stash_mg,
            investor.warehouse_mg - mg_to_export,
        )?;
        let bonus_bps = warehouse_export_bonus_bps(mg_to_export);
        let total_multiplier_bps = if bonus_bps > 0 {
            self.store_mut()
                .adjust_sale_multiplier(tenant, user, bonus_bps)?
                .sale_multiplier_bps
        } else {
            investor.sale_multiplier_bps
        };
        self.record(
            tenant,
            user,
            TransactionKind::WarehouseExport,
            0,
            mg_to_export,
            json!({
                "multiplier_bps_gained": bonus_bps,
                "multiplier_bps_total": total_multiplier_bps,
            }),
            now,
        )?;
        Ok(WarehouseExportReceipt {
            exported_mg: mg_to_export,
            bonus_bps,
            total_multiplier_bps,
        })
    }

    /// Destroys warehouse inventory with no compensation.
    pub fn abandon_warehouse(
        &mut self,
        tenant: &str,
        user: &str,
        mg_to_burn: u64,
        now: u64,
    ) -> Result<u64, CartelError> {
        if mg_to_burn == 0 {
            return Err(CartelError::AmountRequired);
        }
        let investor = self.store_mut().investor(tenant, user)?;
        if investor.warehouse_mg < mg_to_burn {
            return Err(CartelError::InsufficientWarehouse);
        }
        self.store_mut().set_holdings(
            tenant,
            user,
            investor.stash_mg,
            investor.warehouse_mg - mg_to_burn,
        )?;
        self.record(
            tenant,
            user,
            TransactionKind::WarehouseBurn,
            0,
            mg_to_burn,
            json!({}),
            now,
        )?;
        Ok(mg_to_burn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_bonus_counts_whole_kilo_units() {
        assert_eq!(warehouse_export_bonus_bps(0), 0);
        assert_eq!(warehouse_export_bonus_bps(EXPORT_UNIT_MG - 1), 0);
        assert_eq!(warehouse_export_bonus_bps(EXPORT_UNIT_MG), 100);
        assert_eq!(warehouse_export_bonus_bps(5 * EXPORT_UNIT_MG + 123), 500);
    }
}
