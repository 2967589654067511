//! Peer-to-peer share market: direct-fill order matching with expiry
//! pruning, plus the synthetic house desk that always quotes both sides.
//!
//! There is no escrow at order creation; solvency is checked at fill time,
//! and a maker who can no longer honor their order has it cancelled as a
//! side effect of the failed fill.

use serde_json::json;
use uuid::Uuid;

use contracts::{
    MarketFill, MarketOrder, MarketQuote, OrderSide, OrderStatus, TransactionKind,
    SEMUTA_DESK_BUY_ORDER_ID, SEMUTA_DESK_SELL_ORDER_ID, SEMUTA_DESK_USER_ID,
};

use crate::error::CartelError;
use crate::ledger::{Ledger, LedgerError};
use crate::service::Cartel;
use crate::store::Store;

pub const ORDER_EXPIRATION_SECONDS: u64 = 14 * 24 * 60 * 60;
pub const SHARE_MARKET_MAX_SHARES: u64 = 1_000_000;
pub const SHARE_MARKET_MAX_PRICE: u64 = 1_000_000;
pub const SHARE_MARKET_LIST_LIMIT: usize = 10;
pub const SHARE_MARKET_USER_LIMIT: usize = 25;

/// Desk quotes as a function of total shares outstanding: the sell side
/// climbs one chip per ten shares, the buy side stays at half of it. The
/// widening spread simulates dilution pressure.
pub fn desk_prices(total_shares: u64) -> MarketQuote {
    let sell_price = (100 + total_shares / 10).max(1);
    let buy_price = (sell_price / 2).max(1);
    MarketQuote {
        sell_price,
        buy_price,
    }
}

fn is_desk_sell_order(order_id: &str) -> bool {
    order_id.starts_with(SEMUTA_DESK_SELL_ORDER_ID)
}

fn is_desk_buy_order(order_id: &str) -> bool {
    order_id.starts_with(SEMUTA_DESK_BUY_ORDER_ID)
}

fn is_desk_order(order: &MarketOrder) -> bool {
    order.user_id == SEMUTA_DESK_USER_ID
        || is_desk_sell_order(&order.order_id)
        || is_desk_buy_order(&order.order_id)
}

/// Desk orders never expire; they have no backing allocation to release.
pub fn is_order_expired(order: &MarketOrder, now: u64) -> bool {
    if is_desk_order(order) || order.created_at == 0 {
        return false;
    }
    now.saturating_sub(order.created_at) > ORDER_EXPIRATION_SECONDS
}

impl<S: Store + Ledger> Cartel<S> {
    fn total_shares(&mut self, tenant: &str) -> Result<u64, CartelError> {
        Ok(self
            .store_mut()
            .list_investors(tenant)?
            .iter()
            .map(|inv| inv.shares)
            .sum())
    }

    pub fn market_quote(&mut self, tenant: &str) -> Result<MarketQuote, CartelError> {
        let total_shares = self.total_shares(tenant)?;
        Ok(desk_prices(total_shares))
    }

    pub fn create_market_order(
        &mut self,
        tenant: &str,
        user: &str,
        side: OrderSide,
        shares: u64,
        price_per_share: u64,
        now: u64,
    ) -> Result<MarketOrder, CartelError> {
        if shares == 0 {
            return Err(CartelError::MarketSharesRequired);
        }
        if shares > SHARE_MARKET_MAX_SHARES {
            return Err(CartelError::MarketShareLimit {
                limit: SHARE_MARKET_MAX_SHARES,
            });
        }
        if price_per_share == 0 {
            return Err(CartelError::MarketPriceRequired);
        }
        if price_per_share > SHARE_MARKET_MAX_PRICE {
            return Err(CartelError::MarketPriceLimit {
                limit: SHARE_MARKET_MAX_PRICE,
            });
        }
        let order = MarketOrder {
            tenant_id: tenant.to_string(),
            order_id: Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            side,
            shares,
            price_per_share,
            status: OrderStatus::Open,
            created_at: now,
        };
        self.store_mut().create_order(&order)?;
        Ok(order)
    }

    /// Marks an expired order terminal, then reports the staleness.
    fn ensure_order_not_expired(
        &mut self,
        tenant: &str,
        order: MarketOrder,
        now: u64,
    ) -> Result<MarketOrder, CartelError> {
        if is_order_expired(&order, now) {
            self.store_mut()
                .set_order_status(tenant, &order.order_id, OrderStatus::Expired)?;
            return Err(CartelError::OrderExpired);
        }
        Ok(order)
    }

    /// Drops expired rows from a listing, expiring them in the store as a
    /// side effect.
    fn prune_expired(
        &mut self,
        tenant: &str,
        orders: Vec<MarketOrder>,
        now: u64,
    ) -> Result<Vec<MarketOrder>, CartelError> {
        let mut fresh = Vec::with_capacity(orders.len());
        for order in orders {
            if is_order_expired(&order, now) {
                self.store_mut()
                    .set_order_status(tenant, &order.order_id, OrderStatus::Expired)?;
                continue;
            }
            fresh.push(order);
        }
        Ok(fresh)
    }

    pub fn list_market_orders(
        &mut self,
        tenant: &str,
        side: OrderSide,
        limit: usize,
        now: u64,
    ) -> Result<Vec<MarketOrder>, CartelError> {
        let limit = limit.clamp(1, SHARE_MARKET_LIST_LIMIT);
        let orders = self.store_mut().list_orders(tenant, side, limit)?;
        self.prune_expired(tenant, orders, now)
    }

    pub fn list_my_market_orders(
        &mut self,
        tenant: &str,
        user: &str,
        limit: usize,
        now: u64,
    ) -> Result<Vec<MarketOrder>, CartelError> {
        let limit = limit.clamp(1, SHARE_MARKET_USER_LIMIT);
        let orders = self.store_mut().list_orders_for_user(tenant, user, limit)?;
        self.prune_expired(tenant, orders, now)
    }

    pub fn cancel_market_order(
        &mut self,
        tenant: &str,
        user: &str,
        order_id: &str,
        now: u64,
    ) -> Result<MarketOrder, CartelError> {
        let order = self
            .store_mut()
            .order(tenant, order_id)?
            .ok_or(CartelError::OrderNotFound)?;
        let order = self.ensure_order_not_expired(tenant, order, now)?;
        if order.user_id != user {
            return Err(CartelError::OrderNotOwner);
        }
        if order.status != OrderStatus::Open {
            return Err(CartelError::OrderClosed);
        }
        self.store_mut()
            .set_order_status(tenant, order_id, OrderStatus::Cancelled)?;
        self.store_mut()
            .order(tenant, order_id)?
            .ok_or(CartelError::OrderNotFound)
    }

    /// Fills a named SELL order (or the desk's virtual sell quote) as the
    /// buying taker.
    pub fn execute_market_buy(
        &mut self,
        tenant: &str,
        buyer: &str,
        order_id: &str,
        share_amount: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let shares = share_amount.max(1);
        if is_desk_sell_order(order_id) {
            return self.desk_purchase(tenant, buyer, shares, now);
        }
        let order = self
            .store_mut()
            .order(tenant, order_id)?
            .ok_or(CartelError::OrderNotFound)?;
        let order = self.ensure_order_not_expired(tenant, order, now)?;
        if order.status != OrderStatus::Open || order.side != OrderSide::Sell {
            return Err(CartelError::OrderNotFound);
        }
        self.fill_sell_order_with_buyer(tenant, buyer, order, shares, now)
    }

    /// Fills a named BUY order (or the desk's virtual buy quote) as the
    /// selling taker.
    pub fn execute_market_sell(
        &mut self,
        tenant: &str,
        seller: &str,
        order_id: &str,
        share_amount: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let shares = share_amount.max(1);
        if is_desk_buy_order(order_id) {
            return self.desk_sale(tenant, seller, shares, now);
        }
        let order = self
            .store_mut()
            .order(tenant, order_id)?
            .ok_or(CartelError::OrderNotFound)?;
        let order = self.ensure_order_not_expired(tenant, order, now)?;
        if order.status != OrderStatus::Open || order.side != OrderSide::Buy {
            return Err(CartelError::OrderNotFound);
        }
        self.fill_buy_order_with_seller(tenant, seller, order, shares, now)
    }

    fn fill_sell_order_with_buyer(
        &mut self,
        tenant: &str,
        buyer: &str,
        order: MarketOrder,
        shares: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let seller = order.user_id.clone();
        if buyer == seller {
            return Err(CartelError::SelfFill);
        }
        let available = order.shares;
        if shares > available {
            return Err(CartelError::OrderShortfall {
                remaining: available,
            });
        }
        let seller_profile = self.store_mut().investor(tenant, &seller)?;
        if seller_profile.shares < shares {
            // The maker can no longer honor the order; retire it so it does
            // not keep attracting takers.
            self.store_mut()
                .set_order_status(tenant, &order.order_id, OrderStatus::Cancelled)?;
            return Err(CartelError::OrderStale {
                maker_side: OrderSide::Sell,
            });
        }
        let price = order.price_per_share.max(1);
        let total_cost = shares * price;
        match self
            .store_mut()
            .transfer_user_to_house(tenant, buyer, total_cost, "cartel market buy")
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientUser) => {
                return Err(CartelError::MarketInsufficientChips)
            }
            Err(err) => return Err(err.into()),
        }
        self.store_mut()
            .transfer_house_to_user(tenant, &seller, total_cost, "cartel market sale payout")?;
        self.store_mut().remove_shares(tenant, &seller, shares)?;
        self.store_mut().add_shares(tenant, buyer, shares)?;
        let remaining = available - shares;
        let status = if remaining > 0 {
            OrderStatus::Open
        } else {
            OrderStatus::Filled
        };
        self.store_mut()
            .set_order_shares(tenant, &order.order_id, remaining, status)?;
        self.record_fill_pair(tenant, buyer, &seller, &order.order_id, shares, price, total_cost, now)?;
        Ok(MarketFill {
            direction: OrderSide::Buy,
            shares_filled: shares,
            price_per_share: price,
            chips: total_cost,
            counterparty_id: seller,
            order_id: order.order_id,
            desk: false,
        })
    }

    fn fill_buy_order_with_seller(
        &mut self,
        tenant: &str,
        seller: &str,
        order: MarketOrder,
        shares: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let buyer = order.user_id.clone();
        if buyer == seller {
            return Err(CartelError::SelfFill);
        }
        let available = order.shares;
        if shares > available {
            return Err(CartelError::OrderShortfall {
                remaining: available,
            });
        }
        let seller_profile = self.store_mut().investor(tenant, seller)?;
        if seller_profile.shares < shares {
            return Err(CartelError::InsufficientShares);
        }
        let price = order.price_per_share.max(1);
        let total_cost = shares * price;
        match self
            .store_mut()
            .transfer_user_to_house(tenant, &buyer, total_cost, "cartel market buy fill")
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientUser) => {
                // The buying maker has gone insolvent; cancel their order.
                self.store_mut().set_order_status(
                    tenant,
                    &order.order_id,
                    OrderStatus::Cancelled,
                )?;
                return Err(CartelError::OrderStale {
                    maker_side: OrderSide::Buy,
                });
            }
            Err(err) => return Err(err.into()),
        }
        self.store_mut()
            .transfer_house_to_user(tenant, seller, total_cost, "cartel market sell payout")?;
        self.store_mut().remove_shares(tenant, seller, shares)?;
        self.store_mut().add_shares(tenant, &buyer, shares)?;
        let remaining = available - shares;
        let status = if remaining > 0 {
            OrderStatus::Open
        } else {
            OrderStatus::Filled
        };
        self.store_mut()
            .set_order_shares(tenant, &order.order_id, remaining, status)?;
        self.record_fill_pair(tenant, &buyer, seller, &order.order_id, shares, price, total_cost, now)?;
        Ok(MarketFill {
            direction: OrderSide::Sell,
            shares_filled: shares,
            price_per_share: price,
            chips: total_cost,
            counterparty_id: buyer,
            order_id: order.order_id,
            desk: false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn record_fill_pair(
        &mut self,
        tenant: &str,
        buyer: &str,
        seller: &str,
        order_id: &str,
        shares: u64,
        price: u64,
        chips: u64,
        now: u64,
    ) -> Result<(), CartelError> {
        self.record(
            tenant,
            buyer,
            TransactionKind::MarketBuy,
            chips,
            0,
            json!({
                "order_id": order_id,
                "shares": shares,
                "price_per_share": price,
                "seller_id": seller,
            }),
            now,
        )?;
        self.record(
            tenant,
            seller,
            TransactionKind::MarketSell,
            chips,
            0,
            json!({
                "order_id": order_id,
                "shares": shares,
                "price_per_share": price,
                "buyer_id": buyer,
            }),
            now,
        )
    }

    /// Buys newly quoted shares from the desk at the dynamic sell price.
    fn desk_purchase(
        &mut self,
        tenant: &str,
        buyer: &str,
        shares: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let quote = self.market_quote(tenant)?;
        let total_cost = shares * quote.sell_price;
        match self
            .store_mut()
            .transfer_user_to_house(tenant, buyer, total_cost, "semuta desk market buy")
        {
            Ok(()) => {}
            Err(LedgerError::InsufficientUser) => {
                return Err(CartelError::MarketInsufficientChips)
            }
            Err(err) => return Err(err.into()),
        }
        self.store_mut().add_shares(tenant, buyer, shares)?;
        self.record(
            tenant,
            buyer,
            TransactionKind::MarketBuy,
            total_cost,
            0,
            json!({
                "order_id": SEMUTA_DESK_SELL_ORDER_ID,
                "shares": shares,
                "price_per_share": quote.sell_price,
                "seller_id": SEMUTA_DESK_USER_ID,
            }),
            now,
        )?;
        Ok(MarketFill {
            direction: OrderSide::Buy,
            shares_filled: shares,
            price_per_share: quote.sell_price,
            chips: total_cost,
            counterparty_id: SEMUTA_DESK_USER_ID.to_string(),
            order_id: SEMUTA_DESK_SELL_ORDER_ID.to_string(),
            desk: true,
        })
    }

    /// Sells shares back to the desk at the dynamic buy price.
    fn desk_sale(
        &mut self,
        tenant: &str,
        seller: &str,
        shares: u64,
        now: u64,
    ) -> Result<MarketFill, CartelError> {
        let seller_profile = self.store_mut().investor(tenant, seller)?;
        if seller_profile.shares < shares {
            return Err(CartelError::InsufficientShares);
        }
        let quote = self.market_quote(tenant)?;
        let payout = shares * quote.buy_price;
        self.store_mut()
            .transfer_house_to_user(tenant, seller, payout, "semuta desk market sell")?;
        self.store_mut().remove_shares(tenant, seller, shares)?;
        self.record(
            tenant,
            seller,
            TransactionKind::MarketSell,
            payout,
            0,
            json!({
                "order_id": SEMUTA_DESK_BUY_ORDER_ID,
                "shares": shares,
                "price_per_share": quote.buy_price,
                "buyer_id": SEMUTA_DESK_USER_ID,
            }),
            now,
        )?;
        Ok(MarketFill {
            direction: OrderSide::Sell,
            shares_filled: shares,
            price_per_share: quote.buy_price,
            chips: payout,
            counterparty_id: SEMUTA_DESK_USER_ID.to_string(),
            order_id: SEMUTA_DESK_BUY_ORDER_ID.to_string(),
            desk: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desk_quote_fixtures() {
        let quote = desk_prices(0);
        assert_eq!(quote.sell_price, 100);
        assert_eq!(quote.buy_price, 50);

        let quote = desk_prices(1_000);
        assert_eq!(quote.sell_price, 200);
        assert_eq!(quote.buy_price, 100);

        // Sub-ten share counts floor away.
        assert_eq!(desk_prices(9).sell_price, 100);
        assert_eq!(desk_prices(15).sell_price, 101);
    }

    fn order(order_id: &str, user_id: &str, created_at: u64) -> MarketOrder {
        MarketOrder {
            tenant_id: "t1".to_string(),
            order_id: order_id.to_string(),
            user_id: user_id.to_string(),
            side: OrderSide::Sell,
            shares: 1,
            price_per_share: 10,
            status: OrderStatus::Open,
            created_at,
        }
    }

    #[test]
    fn expiry_skips_desk_orders_and_fresh_orders() {
        let now = ORDER_EXPIRATION_SECONDS + 1_000;
        assert!(is_order_expired(&order("abc", "alice", 100), now));
        assert!(!is_order_expired(&order("abc", "alice", 999), now - 999));
        assert!(!is_order_expired(
            &order("sell_SEMUTA_CARTEL", SEMUTA_DESK_USER_ID, 100),
            now
        ));
        // Untouched legacy rows without a creation stamp never expire.
        assert!(!is_order_expired(&order("abc", "alice", 0), now));
    }
}
