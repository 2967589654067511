use contracts::{OrderSide, OrderStatus, SEMUTA_DESK_BUY_ORDER_ID, SEMUTA_DESK_SELL_ORDER_ID};

use cartel_core::config::CartelConfig;
use cartel_core::error::CartelError;
use cartel_core::service::market::ORDER_EXPIRATION_SECONDS;
use cartel_core::store::Store;
use cartel_core::{Cartel, MemoryStore};

const T0: u64 = 1_700_000_000;
const TENANT: &str = "guild-1";

fn new_cartel() -> Cartel<MemoryStore> {
    Cartel::new(MemoryStore::new(), CartelConfig::default())
}

fn seed_shareholder(cartel: &mut Cartel<MemoryStore>, user: &str, shares: u64) {
    cartel
        .store_mut()
        .add_shares(TENANT, user, shares)
        .expect("shares");
}

#[test]
fn order_validation_rejects_before_any_mutation() {
    let mut cartel = new_cartel();
    let err = cartel
        .create_market_order(TENANT, "alice", OrderSide::Sell, 0, 10, T0)
        .expect_err("zero shares");
    assert!(matches!(err, CartelError::MarketSharesRequired));

    let err = cartel
        .create_market_order(TENANT, "alice", OrderSide::Sell, 2_000_000, 10, T0)
        .expect_err("share cap");
    assert!(matches!(err, CartelError::MarketShareLimit { .. }));

    let err = cartel
        .create_market_order(TENANT, "alice", OrderSide::Sell, 10, 0, T0)
        .expect_err("zero price");
    assert!(matches!(err, CartelError::MarketPriceRequired));

    let err = cartel
        .create_market_order(TENANT, "alice", OrderSide::Buy, 10, 2_000_000, T0)
        .expect_err("price cap");
    assert!(matches!(err, CartelError::MarketPriceLimit { .. }));
}

#[test]
fn partial_fill_keeps_the_order_open_until_exhausted() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    cartel.store_mut().credit_user(TENANT, "buyer", 10_000);

    let order = cartel
        .create_market_order(TENANT, "seller", OrderSide::Sell, 10, 25, T0)
        .expect("order");

    let fill = cartel
        .execute_market_buy(TENANT, "buyer", &order.order_id, 4, T0 + 10)
        .expect("partial fill");
    assert_eq!(fill.shares_filled, 4);
    assert_eq!(fill.chips, 100);
    assert_eq!(fill.counterparty_id, "seller");

    let open = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(open.status, OrderStatus::Open);
    assert_eq!(open.shares, 6);

    let fill = cartel
        .execute_market_buy(TENANT, "buyer", &order.order_id, 6, T0 + 20)
        .expect("closing fill");
    assert_eq!(fill.shares_filled, 6);

    let filled = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(filled.status, OrderStatus::Filled);
    assert_eq!(filled.shares, 0);

    // Shares and chips both moved through the house without loss.
    assert_eq!(
        cartel.store_mut().investor(TENANT, "buyer").expect("b").shares,
        10
    );
    assert_eq!(
        cartel.store_mut().investor(TENANT, "seller").expect("s").shares,
        0
    );
    assert_eq!(cartel.store().user_balance(TENANT, "seller"), 250);
    assert_eq!(cartel.store().user_balance(TENANT, "buyer"), 9_750);
    assert!(cartel.store().verify_conservation());
}

#[test]
fn overfill_reports_the_remaining_size() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    cartel.store_mut().credit_user(TENANT, "buyer", 10_000);
    let order = cartel
        .create_market_order(TENANT, "seller", OrderSide::Sell, 5, 25, T0)
        .expect("order");

    let err = cartel
        .execute_market_buy(TENANT, "buyer", &order.order_id, 6, T0)
        .expect_err("too many");
    assert!(matches!(err, CartelError::OrderShortfall { remaining: 5 }));
}

#[test]
fn stale_sell_order_cancels_when_maker_sold_elsewhere() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    cartel.store_mut().credit_user(TENANT, "buyer", 10_000);
    let order = cartel
        .create_market_order(TENANT, "seller", OrderSide::Sell, 10, 25, T0)
        .expect("order");

    // Maker's inventory disappears out from under the order.
    cartel
        .store_mut()
        .remove_shares(TENANT, "seller", 8)
        .expect("drain");

    let err = cartel
        .execute_market_buy(TENANT, "buyer", &order.order_id, 5, T0)
        .expect_err("stale");
    assert!(matches!(err, CartelError::OrderStale { maker_side: OrderSide::Sell }));
    let cancelled = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    // The taker paid nothing.
    assert_eq!(cartel.store().user_balance(TENANT, "buyer"), 10_000);
}

#[test]
fn stale_buy_order_cancels_when_maker_is_broke() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    let order = cartel
        .create_market_order(TENANT, "buyer", OrderSide::Buy, 10, 25, T0)
        .expect("order");

    let err = cartel
        .execute_market_sell(TENANT, "seller", &order.order_id, 5, T0)
        .expect_err("stale");
    assert!(matches!(err, CartelError::OrderStale { maker_side: OrderSide::Buy }));
    let cancelled = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    // The selling taker kept their shares.
    assert_eq!(
        cartel.store_mut().investor(TENANT, "seller").expect("s").shares,
        10
    );
}

#[test]
fn taker_without_shares_does_not_kill_the_buy_order() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, "buyer", 10_000);
    let order = cartel
        .create_market_order(TENANT, "buyer", OrderSide::Buy, 10, 25, T0)
        .expect("order");

    let err = cartel
        .execute_market_sell(TENANT, "seller", &order.order_id, 5, T0)
        .expect_err("taker short");
    assert!(matches!(err, CartelError::InsufficientShares));
    let still_open = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(still_open.status, OrderStatus::Open);
}

#[test]
fn self_fill_is_rejected() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "alice", 10);
    cartel.store_mut().credit_user(TENANT, "alice", 10_000);
    let order = cartel
        .create_market_order(TENANT, "alice", OrderSide::Sell, 10, 25, T0)
        .expect("order");

    let err = cartel
        .execute_market_buy(TENANT, "alice", &order.order_id, 1, T0)
        .expect_err("self fill");
    assert!(matches!(err, CartelError::SelfFill));
}

#[test]
fn orders_expire_after_the_ttl_and_stay_terminal() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    let order = cartel
        .create_market_order(TENANT, "seller", OrderSide::Sell, 10, 25, T0)
        .expect("order");

    let late = T0 + ORDER_EXPIRATION_SECONDS + 1;
    let listed = cartel
        .list_market_orders(TENANT, OrderSide::Sell, 10, late)
        .expect("list");
    assert!(listed.is_empty());
    let expired = cartel
        .store_mut()
        .order(TENANT, &order.order_id)
        .expect("read")
        .expect("order");
    assert_eq!(expired.status, OrderStatus::Expired);

    let err = cartel
        .execute_market_buy(TENANT, "buyer", &order.order_id, 1, late)
        .expect_err("expired");
    assert!(matches!(err, CartelError::OrderNotFound | CartelError::OrderExpired));
}

#[test]
fn cancel_requires_ownership_and_an_open_order() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "seller", 10);
    let order = cartel
        .create_market_order(TENANT, "seller", OrderSide::Sell, 10, 25, T0)
        .expect("order");

    let err = cartel
        .cancel_market_order(TENANT, "mallory", &order.order_id, T0)
        .expect_err("not the owner");
    assert!(matches!(err, CartelError::OrderNotOwner));

    let cancelled = cartel
        .cancel_market_order(TENANT, "seller", &order.order_id, T0)
        .expect("cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = cartel
        .cancel_market_order(TENANT, "seller", &order.order_id, T0)
        .expect_err("already closed");
    assert!(matches!(err, CartelError::OrderClosed));
}

#[test]
fn desk_quotes_both_sides_and_moves_shares() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, "alice", 10_000);

    // Empty pool: sell at 100, buy at 50.
    let quote = cartel.market_quote(TENANT).expect("quote");
    assert_eq!((quote.sell_price, quote.buy_price), (100, 50));

    let fill = cartel
        .execute_market_buy(TENANT, "alice", SEMUTA_DESK_SELL_ORDER_ID, 5, T0)
        .expect("desk buy");
    assert!(fill.desk);
    assert_eq!(fill.price_per_share, 100);
    assert_eq!(fill.chips, 500);
    assert_eq!(
        cartel.store_mut().investor(TENANT, "alice").expect("a").shares,
        5
    );

    let fill = cartel
        .execute_market_sell(TENANT, "alice", SEMUTA_DESK_BUY_ORDER_ID, 2, T0 + 10)
        .expect("desk sell");
    assert!(fill.desk);
    assert_eq!(fill.price_per_share, 50);
    assert_eq!(fill.chips, 100);
    assert_eq!(
        cartel.store_mut().investor(TENANT, "alice").expect("a").shares,
        3
    );
    assert!(cartel.store().verify_conservation());
}

#[test]
fn desk_scales_its_quote_with_total_shares() {
    let mut cartel = new_cartel();
    seed_shareholder(&mut cartel, "whale", 1_000);
    let quote = cartel.market_quote(TENANT).expect("quote");
    assert_eq!((quote.sell_price, quote.buy_price), (200, 100));
}
