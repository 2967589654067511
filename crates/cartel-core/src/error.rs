//! Closed error taxonomy for cartel operations.
//!
//! Every variant carries a stable machine code (`code()`) and classifies
//! into one of the taxonomy buckets (`kind()`): validation errors are
//! rejected before any state mutation, insufficiency errors surface after
//! rollback of partial mutations, and staleness errors mark the stale
//! entity terminal before surfacing.

use std::fmt;

use contracts::OrderSide;

use crate::ledger::LedgerError;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Insufficiency,
    Staleness,
    Internal,
}

#[derive(Debug)]
pub enum CartelError {
    // Validation
    AmountRequired,
    ShareAmountRequired,
    InvestBelowMinimum { share_price: u64 },
    PriceInvalid,
    RateInvalid,
    InvalidTier,
    RankTooLow { required_rank: u32, tier_name: &'static str },
    DealerCap { rank: u32, cap: usize },
    UpkeepAmountRequired,
    UpkeepTooLow { minimum_chips: u64 },
    MarketSharesRequired,
    MarketShareLimit { limit: u64 },
    MarketPriceRequired,
    MarketPriceLimit { limit: u64 },
    SelfFill,

    // Insufficiency
    InsufficientChips,
    MarketInsufficientChips,
    HouseEmpty,
    InsufficientShares,
    InsufficientStash,
    InsufficientWarehouse,
    NoDealerChips,
    NoDealers,

    // Staleness
    DealerNotFound,
    OrderNotFound,
    OrderNotOwner,
    OrderClosed,
    OrderExpired,
    OrderShortfall { remaining: u64 },
    OrderStale { maker_side: OrderSide },

    // Internal
    Store(StoreError),
}

impl CartelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AmountRequired
            | Self::ShareAmountRequired
            | Self::InvestBelowMinimum { .. }
            | Self::PriceInvalid
            | Self::RateInvalid
            | Self::InvalidTier
            | Self::RankTooLow { .. }
            | Self::DealerCap { .. }
            | Self::UpkeepAmountRequired
            | Self::UpkeepTooLow { .. }
            | Self::MarketSharesRequired
            | Self::MarketShareLimit { .. }
            | Self::MarketPriceRequired
            | Self::MarketPriceLimit { .. }
            | Self::SelfFill => ErrorKind::Validation,

            Self::InsufficientChips
            | Self::MarketInsufficientChips
            | Self::HouseEmpty
            | Self::InsufficientShares
            | Self::InsufficientStash
            | Self::InsufficientWarehouse
            | Self::NoDealerChips
            | Self::NoDealers => ErrorKind::Insufficiency,

            Self::DealerNotFound
            | Self::OrderNotFound
            | Self::OrderNotOwner
            | Self::OrderClosed
            | Self::OrderExpired
            | Self::OrderShortfall { .. }
            | Self::OrderStale { .. } => ErrorKind::Staleness,

            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::AmountRequired => "CARTEL_AMOUNT_REQUIRED",
            Self::ShareAmountRequired => "CARTEL_SHARE_AMOUNT_REQUIRED",
            Self::InvestBelowMinimum { .. } => "CARTEL_INVEST_MIN",
            Self::PriceInvalid => "CARTEL_PRICE_INVALID",
            Self::RateInvalid => "CARTEL_RATE_INVALID",
            Self::InvalidTier => "CARTEL_INVALID_TIER",
            Self::RankTooLow { .. } => "CARTEL_RANK_TOO_LOW",
            Self::DealerCap { .. } => "CARTEL_DEALER_CAP",
            Self::UpkeepAmountRequired => "CARTEL_UPKEEP_AMOUNT_REQUIRED",
            Self::UpkeepTooLow { .. } => "CARTEL_UPKEEP_TOO_LOW",
            Self::MarketSharesRequired => "CARTEL_MARKET_SHARES_REQUIRED",
            Self::MarketShareLimit { .. } => "CARTEL_MARKET_SHARE_LIMIT",
            Self::MarketPriceRequired => "CARTEL_MARKET_PRICE_REQUIRED",
            Self::MarketPriceLimit { .. } => "CARTEL_MARKET_PRICE_LIMIT",
            Self::SelfFill => "CARTEL_MARKET_SELF",
            Self::InsufficientChips => "CARTEL_NO_CHIPS",
            Self::MarketInsufficientChips => "CARTEL_MARKET_NO_CHIPS",
            Self::HouseEmpty => "CARTEL_HOUSE_EMPTY",
            Self::InsufficientShares => "CARTEL_NOT_ENOUGH_SHARES",
            Self::InsufficientStash => "CARTEL_NOT_ENOUGH_STASH",
            Self::InsufficientWarehouse => "CARTEL_NOT_ENOUGH_WAREHOUSE",
            Self::NoDealerChips => "CARTEL_NO_DEALER_CHIPS",
            Self::NoDealers => "CARTEL_NO_DEALERS",
            Self::DealerNotFound => "CARTEL_DEALER_NOT_FOUND",
            Self::OrderNotFound => "CARTEL_MARKET_ORDER_NOT_FOUND",
            Self::OrderNotOwner => "CARTEL_MARKET_ORDER_NOT_OWNER",
            Self::OrderClosed => "CARTEL_MARKET_ORDER_CLOSED",
            Self::OrderExpired => "CARTEL_MARKET_ORDER_EXPIRED",
            Self::OrderShortfall { .. } => "CARTEL_MARKET_LIMIT",
            Self::OrderStale { .. } => "CARTEL_MARKET_ORDER_STALE",
            Self::Store(_) => "CARTEL_STORE_FAILURE",
        }
    }
}

impl fmt::Display for CartelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmountRequired => write!(f, "Enter a positive amount of Semuta."),
            Self::ShareAmountRequired => write!(f, "Enter at least 1 share."),
            Self::InvestBelowMinimum { share_price } => {
                write!(f, "Invest at least {share_price} chips (one full share).")
            }
            Self::PriceInvalid => write!(f, "Provide a positive chip price per share."),
            Self::RateInvalid => {
                write!(f, "Provide a positive grams-per-hour of Semuta value.")
            }
            Self::InvalidTier => write!(f, "Choose a valid dealer tier."),
            Self::RankTooLow { required_rank, tier_name } => {
                write!(f, "Rank {required_rank} is required for a {tier_name}.")
            }
            Self::DealerCap { rank, cap } => write!(
                f,
                "Rank {rank} investors can manage at most {cap} dealers. Rank up to unlock more slots."
            ),
            Self::UpkeepAmountRequired => {
                write!(f, "Enter the chips you want to spend on upkeep.")
            }
            Self::UpkeepTooLow { minimum_chips } => write!(
                f,
                "Spend at least {minimum_chips} chips to buy any time for this dealer."
            ),
            Self::MarketSharesRequired => write!(f, "Enter at least 1 share."),
            Self::MarketShareLimit { limit } => {
                write!(f, "Limit orders to {limit} shares or fewer.")
            }
            Self::MarketPriceRequired => write!(f, "Enter a positive chip price per share."),
            Self::MarketPriceLimit { limit } => {
                write!(f, "Limit price per share to {limit} chips or fewer.")
            }
            Self::SelfFill => write!(f, "You cannot fill your own market order."),
            Self::InsufficientChips => write!(f, "You do not have enough chips for that."),
            Self::MarketInsufficientChips => {
                write!(f, "You do not have enough chips to buy that order.")
            }
            Self::HouseEmpty => {
                write!(f, "The house bank is too low to cover that. Try again soon.")
            }
            Self::InsufficientShares => write!(f, "You do not have that many shares."),
            Self::InsufficientStash => {
                write!(f, "You do not have that much Semuta in your stash.")
            }
            Self::InsufficientWarehouse => {
                write!(f, "You do not have that much Semuta in storage.")
            }
            Self::NoDealerChips => write!(f, "Your dealers have no chips ready to collect."),
            Self::NoDealers => write!(f, "You have no dealers to fire."),
            Self::DealerNotFound => write!(f, "Dealer not found."),
            Self::OrderNotFound => write!(f, "That market order is no longer available."),
            Self::OrderNotOwner => write!(f, "You can only cancel your own market orders."),
            Self::OrderClosed => write!(f, "That market order is already closed."),
            Self::OrderExpired => write!(f, "That market order has expired."),
            Self::OrderShortfall { remaining } => {
                write!(f, "That order only has {remaining} shares remaining.")
            }
            Self::OrderStale { maker_side } => match maker_side {
                OrderSide::Sell => {
                    write!(f, "Seller no longer has enough shares. Order cancelled.")
                }
                OrderSide::Buy => write!(f, "Buyer no longer has chips. Order cancelled."),
            },
            Self::Store(err) => write!(f, "store operation failed: {err}"),
        }
    }
}

impl std::error::Error for CartelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CartelError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InsufficientShares => Self::InsufficientShares,
            other => Self::Store(other),
        }
    }
}

impl From<LedgerError> for CartelError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientUser => Self::InsufficientChips,
            LedgerError::InsufficientHouse => Self::HouseEmpty,
            LedgerError::Backend(detail) => Self::Store(StoreError::Backend(detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_and_classified() {
        assert_eq!(CartelError::InsufficientChips.code(), "CARTEL_NO_CHIPS");
        assert_eq!(CartelError::InsufficientChips.kind(), ErrorKind::Insufficiency);
        assert_eq!(CartelError::OrderExpired.code(), "CARTEL_MARKET_ORDER_EXPIRED");
        assert_eq!(CartelError::OrderExpired.kind(), ErrorKind::Staleness);
        assert_eq!(CartelError::InvalidTier.kind(), ErrorKind::Validation);
        assert_eq!(
            CartelError::Store(StoreError::Backend("boom".to_string())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn ledger_insufficiency_maps_to_domain_errors() {
        assert!(matches!(
            CartelError::from(LedgerError::InsufficientUser),
            CartelError::InsufficientChips
        ));
        assert!(matches!(
            CartelError::from(LedgerError::InsufficientHouse),
            CartelError::HouseEmpty
        ));
    }
}
