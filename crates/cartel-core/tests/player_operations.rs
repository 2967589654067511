use cartel_core::config::CartelConfig;
use cartel_core::error::CartelError;
use cartel_core::store::Store;
use cartel_core::{Cartel, Ledger, MemoryStore};

const T0: u64 = 1_700_000_000;
const TENANT: &str = "guild-1";
const USER: &str = "alice";

fn new_cartel() -> Cartel<MemoryStore> {
    Cartel::new(MemoryStore::new(), CartelConfig::default())
}

#[test]
fn invest_spends_whole_shares_and_leaves_the_remainder() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 1_000);

    let receipt = cartel.invest(TENANT, USER, 250, T0).expect("invest");
    assert_eq!(receipt.shares, 2);
    assert_eq!(receipt.spend, 200);
    assert_eq!(receipt.remainder, 50);
    assert_eq!(receipt.share_price, 100);

    // Only the spent amount left the wallet.
    assert_eq!(cartel.store().user_balance(TENANT, USER), 800);
    assert_eq!(
        cartel.store_mut().investor(TENANT, USER).expect("inv").shares,
        2
    );

    let err = cartel.invest(TENANT, USER, 99, T0).expect_err("below price");
    assert!(matches!(err, CartelError::InvestBelowMinimum { share_price: 100 }));

    let err = cartel.invest(TENANT, "broke", 500, T0).expect_err("no chips");
    assert!(matches!(err, CartelError::InsufficientChips));
    assert!(cartel.store().verify_conservation());
}

#[test]
fn divest_rolls_back_shares_when_the_house_cannot_pay() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 1_000);
    cartel.invest(TENANT, USER, 500, T0).expect("invest");
    // Drain the house below the buy-back price.
    let house = cartel.store().house_balance(TENANT);
    cartel
        .store_mut()
        .transfer_house_to_user(TENANT, "sink", house, "drain")
        .expect("drain");

    let err = cartel.divest(TENANT, USER, 5, T0).expect_err("house empty");
    assert!(matches!(err, CartelError::HouseEmpty));
    assert_eq!(
        cartel.store_mut().investor(TENANT, USER).expect("inv").shares,
        5
    );

    // Refill and the same divest settles at pool price.
    cartel.store_mut().fund_house(TENANT, 10_000);
    let receipt = cartel.divest(TENANT, USER, 5, T0).expect("divest");
    assert_eq!(receipt.payout, 500);
    assert_eq!(
        cartel.store_mut().investor(TENANT, USER).expect("inv").shares,
        0
    );
    assert!(cartel.store().verify_conservation());
}

#[test]
fn sell_stash_pays_floor_price_plus_permanent_bonus() {
    let mut cartel = new_cartel();
    cartel.store_mut().fund_house(TENANT, 100_000);
    cartel
        .store_mut()
        .set_holdings(TENANT, USER, 50_000, 0)
        .expect("stash");
    cartel
        .store_mut()
        .adjust_sale_multiplier(TENANT, USER, 1_000)
        .expect("bonus");

    // 10.5 grams at 3 chips/gram floors to 31 chips; +10% bonus adds 3.
    let receipt = cartel.sell_stash(TENANT, USER, 10_500, T0).expect("sell");
    assert_eq!(receipt.payout, 34);
    assert_eq!(receipt.bonus_chips, 3);
    assert_eq!(receipt.mg_sold, 10_500);
    // 10.5 grams at 2 XP per gram floors to 21 XP.
    assert_eq!(receipt.rank_xp, 21);

    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.stash_mg, 39_500);
    assert_eq!(cartel.store().user_balance(TENANT, USER), 34);
}

#[test]
fn sell_stash_restores_the_stash_when_the_house_is_empty() {
    let mut cartel = new_cartel();
    cartel
        .store_mut()
        .set_holdings(TENANT, USER, 50_000, 0)
        .expect("stash");

    let err = cartel
        .sell_stash(TENANT, USER, 10_000, T0)
        .expect_err("house empty");
    assert!(matches!(err, CartelError::HouseEmpty));

    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.stash_mg, 50_000);
    assert_eq!(investor.rank_xp, 0);
    assert!(cartel.store().verify_conservation());
}

#[test]
fn warehouse_collect_charges_the_fee_and_returns_overflow() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 10_000);
    // Rank 1 cap is 100,000 mg; stash nearly full, warehouse holds plenty.
    cartel
        .store_mut()
        .set_holdings(TENANT, USER, 95_000, 50_000)
        .expect("holdings");

    // 20 grams of notional at 3 chips/gram is 60 chips; 60% fee is 36.
    let receipt = cartel
        .collect_warehouse(TENANT, USER, 20_000, T0)
        .expect("collect");
    assert_eq!(receipt.fee, 36);
    assert_eq!(receipt.collected_mg, 5_000);
    assert_eq!(receipt.overflow_returned_mg, 15_000);

    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.stash_mg, 100_000);
    assert_eq!(investor.warehouse_mg, 45_000);
    assert_eq!(cartel.store().user_balance(TENANT, USER), 10_000 - 36);

    let err = cartel
        .collect_warehouse(TENANT, USER, 100_000, T0)
        .expect_err("not that much stored");
    assert!(matches!(err, CartelError::InsufficientWarehouse));
}

#[test]
fn warehouse_export_grants_permanent_bonus_per_kilo() {
    let mut cartel = new_cartel();
    cartel
        .store_mut()
        .set_holdings(TENANT, USER, 0, 2_500_000)
        .expect("holdings");

    let receipt = cartel
        .export_warehouse(TENANT, USER, None, T0)
        .expect("export all");
    assert_eq!(receipt.exported_mg, 2_500_000);
    // Two full 1,000-gram units.
    assert_eq!(receipt.bonus_bps, 200);
    assert_eq!(receipt.total_multiplier_bps, 200);

    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.warehouse_mg, 0);
    assert_eq!(investor.sale_multiplier_bps, 200);

    let err = cartel
        .export_warehouse(TENANT, USER, None, T0)
        .expect_err("empty warehouse");
    assert!(matches!(err, CartelError::InsufficientWarehouse));
}

#[test]
fn abandon_burns_without_compensation() {
    let mut cartel = new_cartel();
    cartel
        .store_mut()
        .set_holdings(TENANT, USER, 1_000, 9_000)
        .expect("holdings");

    let burned = cartel
        .abandon_warehouse(TENANT, USER, 4_000, T0)
        .expect("burn");
    assert_eq!(burned, 4_000);
    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.warehouse_mg, 5_000);
    assert_eq!(investor.stash_mg, 1_000);
    assert_eq!(cartel.store().user_balance(TENANT, USER), 0);
}

#[test]
fn overview_reports_derived_metrics_for_a_sole_holder() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 100_000);
    cartel.invest(TENANT, USER, 10_000, T0).expect("invest");

    let overview = cartel.overview(TENANT, USER).expect("overview");
    assert_eq!(overview.investor.shares, 100);
    assert_eq!(overview.totals.shares, 100);
    assert_eq!(overview.metrics.share_percent_bps, 10_000);
    // Sole holder at rank 1: 100 shares * 100 mg/h * (1 + 1) * 1.
    assert_eq!(overview.metrics.hourly_production_mg, 20_000);
    assert_eq!(overview.metrics.daily_production_mg, 480_000);
    assert_eq!(overview.metrics.stash_cap_mg, 100_000);
    assert_eq!(overview.metrics.active_investors, 1);
    assert_eq!(overview.metrics.xp_to_next_rank, 150);
    assert!(overview.next_tick_at.is_none());
}

#[test]
fn admin_setters_validate_at_the_edge() {
    let mut cartel = new_cartel();
    let err = cartel.set_share_price(TENANT, 0).expect_err("zero price");
    assert!(matches!(err, CartelError::PriceInvalid));
    let err = cartel.set_share_rate(TENANT, 0).expect_err("zero rate");
    assert!(matches!(err, CartelError::RateInvalid));

    let pool = cartel.set_share_price(TENANT, 250).expect("price");
    assert_eq!(pool.share_price_chips, 250);
    let pool = cartel.set_share_rate(TENANT, 180).expect("rate");
    assert_eq!(pool.share_rate_mg_per_hour, 180);
    let pool = cartel.set_xp_per_gram(TENANT, 4_000).expect("xp rate");
    assert_eq!(pool.xp_per_gram_sold_milli, 4_000);
}

#[test]
fn reset_wipes_the_profile_and_releases_dealers() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 10_000);
    cartel.invest(TENANT, USER, 1_000, T0).expect("invest");
    cartel.hire_dealer(TENANT, USER, 0, None, T0).expect("hire");
    cartel
        .store_mut()
        .set_rank_and_xp(TENANT, USER, 5, 42)
        .expect("rank");

    cartel.reset_investor(TENANT, USER).expect("reset");
    let investor = cartel.store_mut().investor(TENANT, USER).expect("inv");
    assert_eq!(investor.shares, 0);
    assert_eq!(investor.rank, 1);
    assert_eq!(investor.rank_xp, 0);
    assert!(cartel
        .store_mut()
        .list_dealers_for_user(TENANT, USER)
        .expect("dealers")
        .is_empty());
}

#[test]
fn history_returns_the_most_recent_records_first() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, USER, 10_000);
    cartel.invest(TENANT, USER, 100, T0).expect("first");
    cartel.invest(TENANT, USER, 100, T0 + 10).expect("second");

    let history = cartel.history(TENANT, USER, 10).expect("history");
    assert_eq!(history.len(), 2);
    assert!(history[0].created_at >= history[1].created_at);
}
