//! Fixed dealer tier catalog.

use serde::Serialize;

use contracts::MG_PER_GRAM;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct DealerTier {
    pub id: u8,
    pub name: &'static str,
    pub required_rank: u32,
    pub hire_cost: u64,
    pub hourly_sell_cap_mg: u64,
    pub price_multiplier_bps: u64,
    /// Share of the dealer's hourly revenue charged as upkeep, in bps.
    pub upkeep_percent_bps: u64,
    pub upkeep_interval_seconds: u64,
}

const UPKEEP_INTERVAL_SECONDS: u64 = 3_600;

pub const DEALER_TIERS: [DealerTier; 6] = [
    DealerTier {
        id: 0,
        name: "Lookout",
        required_rank: 1,
        hire_cost: 1_000,
        hourly_sell_cap_mg: 5 * MG_PER_GRAM,
        price_multiplier_bps: 8_000,
        upkeep_percent_bps: 5_000,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
    DealerTier {
        id: 1,
        name: "Street Runner",
        required_rank: 2,
        hire_cost: 5_000,
        hourly_sell_cap_mg: 10 * MG_PER_GRAM,
        price_multiplier_bps: 10_000,
        upkeep_percent_bps: 5_000,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
    DealerTier {
        id: 2,
        name: "Courier",
        required_rank: 4,
        hire_cost: 15_000,
        hourly_sell_cap_mg: 30 * MG_PER_GRAM,
        price_multiplier_bps: 10_500,
        upkeep_percent_bps: 3_825,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
    DealerTier {
        id: 3,
        name: "Distributor",
        required_rank: 6,
        hire_cost: 45_000,
        hourly_sell_cap_mg: 80 * MG_PER_GRAM,
        price_multiplier_bps: 11_000,
        upkeep_percent_bps: 2_650,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
    DealerTier {
        id: 4,
        name: "Route Boss",
        required_rank: 8,
        hire_cost: 120_000,
        hourly_sell_cap_mg: 180 * MG_PER_GRAM,
        price_multiplier_bps: 11_800,
        upkeep_percent_bps: 1_475,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
    DealerTier {
        id: 5,
        name: "Kingpin",
        required_rank: 10,
        hire_cost: 300_000,
        hourly_sell_cap_mg: 400 * MG_PER_GRAM,
        price_multiplier_bps: 12_500,
        upkeep_percent_bps: 300,
        upkeep_interval_seconds: UPKEEP_INTERVAL_SECONDS,
    },
];

pub fn dealer_tier(id: u8) -> Option<&'static DealerTier> {
    DEALER_TIERS.get(usize::from(id))
}

/// How many dealers an investor of the given rank may employ at once.
pub fn dealer_cap_for_rank(rank: u32) -> usize {
    let rank = rank.max(1);
    (rank as usize + 1).max(2)
}
