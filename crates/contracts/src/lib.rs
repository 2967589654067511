//! Cross-boundary contracts for the cartel engine, API layer, and persistence.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION_V1: &str = "1.0";

pub const MG_PER_GRAM: u64 = 1_000;
pub const MAX_RANK: u32 = 10;

/// Fixed-point scale for dealer payout arithmetic: one chip equals
/// `MG_PER_GRAM * 10_000` value units (milligrams times basis points).
pub const CHIP_VALUE_UNITS: u64 = MG_PER_GRAM * 10_000;

pub const SECONDS_PER_HOUR: u64 = 3_600;

/// Reserved counterparty id for the always-available house desk.
pub const SEMUTA_DESK_USER_ID: &str = "SEMUTA_CARTEL";
pub const SEMUTA_DESK_SELL_ORDER_ID: &str = "sell_SEMUTA_CARTEL";
pub const SEMUTA_DESK_BUY_ORDER_ID: &str = "buy_SEMUTA_CARTEL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pool {
    pub tenant_id: String,
    pub share_price_chips: u64,
    pub share_rate_mg_per_hour: u64,
    /// Milli-XP awarded per gram sold; kept integer so XP math stays exact.
    pub xp_per_gram_sold_milli: u64,
    /// Unix seconds of the last completed production tick, 0 if never ticked.
    pub last_tick_at: u64,
    pub carryover_mg: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Investor {
    pub tenant_id: String,
    pub user_id: String,
    pub shares: u64,
    pub stash_mg: u64,
    pub warehouse_mg: u64,
    pub rank: u32,
    pub rank_xp: u64,
    /// Permanent sale bonus in basis points; only ever grows.
    pub sale_multiplier_bps: u64,
}

impl Investor {
    pub fn new(tenant_id: &str, user_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            shares: 0,
            stash_mg: 0,
            warehouse_mg: 0,
            rank: 1,
            rank_xp: 0,
            sale_multiplier_bps: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DealerStatus {
    Active,
    Paused,
}

impl DealerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(Self::Active),
            "PAUSED" => Some(Self::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dealer {
    pub tenant_id: String,
    pub dealer_id: String,
    pub user_id: String,
    pub tier: u8,
    pub display_name: Option<String>,
    pub status: DealerStatus,
    pub hourly_sell_cap_mg: u64,
    pub price_multiplier_bps: u64,
    pub upkeep_due_at: u64,
    /// Sub-chip value carried between autosales so fractional payouts are
    /// never discarded.
    pub chip_remainder_units: u64,
    pub pending_chips: u64,
    pub pending_mg: u64,
    pub lifetime_sold_mg: u64,
    /// Unix seconds of the last autosale, 0 if the dealer has never sold.
    pub last_sold_at: u64,
    pub hired_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Expired,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "FILLED" => Some(Self::Filled),
            "CANCELLED" => Some(Self::Cancelled),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Open)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketOrder {
    pub tenant_id: String,
    pub order_id: String,
    pub user_id: String,
    pub side: OrderSide,
    /// Remaining shares; decreases on partial fills.
    pub shares: u64,
    pub price_per_share: u64,
    pub status: OrderStatus,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Invest,
    Divest,
    Sell,
    CollectFee,
    WarehouseBurn,
    WarehouseExport,
    DealerHire,
    DealerFire,
    DealerFireAll,
    DealerUpkeep,
    DealerUpkeepAuto,
    DealerSalePending,
    DealerCollect,
    MarketBuy,
    MarketSell,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invest => "INVEST",
            Self::Divest => "DIVEST",
            Self::Sell => "SELL",
            Self::CollectFee => "COLLECT_FEE",
            Self::WarehouseBurn => "WAREHOUSE_BURN",
            Self::WarehouseExport => "WAREHOUSE_EXPORT",
            Self::DealerHire => "DEALER_HIRE",
            Self::DealerFire => "DEALER_FIRE",
            Self::DealerFireAll => "DEALER_FIRE_ALL",
            Self::DealerUpkeep => "DEALER_UPKEEP",
            Self::DealerUpkeepAuto => "DEALER_UPKEEP_AUTO",
            Self::DealerSalePending => "DEALER_SALE_PENDING",
            Self::DealerCollect => "DEALER_COLLECT",
            Self::MarketBuy => "MARKET_BUY",
            Self::MarketSell => "MARKET_SELL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INVEST" => Some(Self::Invest),
            "DIVEST" => Some(Self::Divest),
            "SELL" => Some(Self::Sell),
            "COLLECT_FEE" => Some(Self::CollectFee),
            "WAREHOUSE_BURN" => Some(Self::WarehouseBurn),
            "WAREHOUSE_EXPORT" => Some(Self::WarehouseExport),
            "DEALER_HIRE" => Some(Self::DealerHire),
            "DEALER_FIRE" => Some(Self::DealerFire),
            "DEALER_FIRE_ALL" => Some(Self::DealerFireAll),
            "DEALER_UPKEEP" => Some(Self::DealerUpkeep),
            "DEALER_UPKEEP_AUTO" => Some(Self::DealerUpkeepAuto),
            "DEALER_SALE_PENDING" => Some(Self::DealerSalePending),
            "DEALER_COLLECT" => Some(Self::DealerCollect),
            "MARKET_BUY" => Some(Self::MarketBuy),
            "MARKET_SELL" => Some(Self::MarketSell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub tenant_id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub chips: u64,
    pub mg: u64,
    pub detail: Value,
    pub created_at: u64,
}

/// One investor's slice of a production tick, persisted as a single batch
/// together with the pool's tick bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductionAllocation {
    pub user_id: String,
    pub allocated_mg: u64,
    pub stash_mg: u64,
    pub warehouse_mg: u64,
    pub rank: u32,
    pub rank_xp: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickSkipReason {
    Interval,
    NoInvestors,
    NoOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Skipped {
        reason: TickSkipReason,
    },
    Produced {
        investors_processed: usize,
        distributed_mg: u64,
        carryover_mg: u64,
        delta_seconds: u64,
        dealer_sales: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantTickReport {
    pub tenant_id: String,
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TenantTickFailure {
    pub tenant_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepReport {
    pub reports: Vec<TenantTickReport>,
    pub failures: Vec<TenantTickFailure>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealerSweep {
    pub processed: usize,
    pub sales: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolTotals {
    pub shares: u64,
    pub stash_mg: u64,
    pub warehouse_mg: u64,
    pub investors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverviewMetrics {
    pub hourly_production_mg: u64,
    pub daily_production_mg: u64,
    pub stash_cap_mg: u64,
    pub share_percent_bps: u64,
    pub active_investors: usize,
    pub share_price_chips: u64,
    pub share_rate_mg_per_hour: u64,
    pub xp_per_gram_sold_milli: u64,
    pub sale_multiplier_bps: u64,
    pub xp_to_next_rank: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Overview {
    pub pool: Pool,
    pub investor: Investor,
    pub totals: PoolTotals,
    pub metrics: OverviewMetrics,
    pub next_tick_at: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankTableEntry {
    pub rank: u32,
    pub xp_to_next: u64,
    pub xp_to_reach: u64,
    pub stash_cap_grams: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketQuote {
    pub sell_price: u64,
    pub buy_price: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketFill {
    pub direction: OrderSide,
    pub shares_filled: u64,
    pub price_per_share: u64,
    pub chips: u64,
    pub counterparty_id: String,
    pub order_id: String,
    pub desk: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvestReceipt {
    pub shares: u64,
    pub spend: u64,
    pub remainder: u64,
    pub share_price: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DivestReceipt {
    pub shares_sold: u64,
    pub payout: u64,
    pub share_price: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StashSaleReceipt {
    pub mg_sold: u64,
    pub payout: u64,
    pub bonus_chips: u64,
    pub rank: u32,
    pub rank_xp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarehouseCollectReceipt {
    pub collected_mg: u64,
    pub overflow_returned_mg: u64,
    pub fee: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarehouseExportReceipt {
    pub exported_mg: u64,
    pub bonus_bps: u64,
    pub total_multiplier_bps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealerCollectReceipt {
    pub total_chips: u64,
    pub total_mg: u64,
    pub xp_gain: u64,
    pub dealers_collected: usize,
    pub rank: u32,
    pub rank_xp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpkeepReceipt {
    pub dealer: Dealer,
    pub seconds_purchased: u64,
    pub chips_spent: u64,
}

/// Error envelope returned by the HTTP facade. `code` is the stable
/// machine-readable error code; `message` is the human-facing text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_string_round_trips() {
        for status in [
            OrderStatus::Open,
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Expired,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        for side in [OrderSide::Buy, OrderSide::Sell] {
            assert_eq!(OrderSide::parse(side.as_str()), Some(side));
        }
        for status in [DealerStatus::Active, DealerStatus::Paused] {
            assert_eq!(DealerStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TransactionKind::parse("MARKET_BUY"), Some(TransactionKind::MarketBuy));
        assert_eq!(OrderStatus::parse("SETTLED"), None);
    }

    #[test]
    fn tick_outcome_serde_shape() {
        let outcome = TickOutcome::Skipped {
            reason: TickSkipReason::Interval,
        };
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["outcome"], "skipped");
        assert_eq!(value["reason"], "interval");
    }
}
