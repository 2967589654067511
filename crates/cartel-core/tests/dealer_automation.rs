use contracts::{DealerStatus, CHIP_VALUE_UNITS};

use cartel_core::config::CartelConfig;
use cartel_core::error::CartelError;
use cartel_core::store::Store;
use cartel_core::{Cartel, MemoryStore};

const T0: u64 = 1_700_000_000;
const TENANT: &str = "guild-1";
const OWNER: &str = "alice";

fn new_cartel() -> Cartel<MemoryStore> {
    Cartel::new(MemoryStore::new(), CartelConfig::default())
}

fn hire_lookout(cartel: &mut Cartel<MemoryStore>, funding: u64) -> String {
    cartel.store_mut().credit_user(TENANT, OWNER, funding);
    let dealer = cartel
        .hire_dealer(TENANT, OWNER, 0, None, T0)
        .expect("hire lookout");
    dealer.dealer_id
}

#[test]
fn hire_enforces_rank_gate_and_dealer_cap() {
    let mut cartel = new_cartel();
    cartel.store_mut().credit_user(TENANT, OWNER, 1_000_000);

    // Rank 1 cannot hire a tier that requires rank 2.
    let err = cartel
        .hire_dealer(TENANT, OWNER, 1, None, T0)
        .expect_err("rank gate");
    assert!(matches!(err, CartelError::RankTooLow { required_rank: 2, .. }));

    let err = cartel
        .hire_dealer(TENANT, OWNER, 9, None, T0)
        .expect_err("unknown tier");
    assert!(matches!(err, CartelError::InvalidTier));

    // Rank 1 caps at two dealers.
    cartel.hire_dealer(TENANT, OWNER, 0, None, T0).expect("first");
    cartel.hire_dealer(TENANT, OWNER, 0, None, T0).expect("second");
    let err = cartel
        .hire_dealer(TENANT, OWNER, 0, None, T0)
        .expect_err("cap");
    assert!(matches!(err, CartelError::DealerCap { cap: 2, .. }));
}

#[test]
fn hire_debits_exactly_the_tier_cost() {
    let mut cartel = new_cartel();
    hire_lookout(&mut cartel, 1_500);
    assert_eq!(cartel.store().user_balance(TENANT, OWNER), 500);
    assert_eq!(cartel.store().house_balance(TENANT), 1_000);
    assert!(cartel.store().verify_conservation());
}

#[test]
fn autosale_carries_fractional_chips_without_drift() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel
        .store_mut()
        .set_holdings(TENANT, OWNER, 2_000_000, 0)
        .expect("stash");

    // Lookout at 0.8x and 3 chips/gram: each 300-second quota moves 416 mg
    // worth 9,984,000 value units, just under one chip.
    let per_tick_units: u128 = 416 * 3 * 8_000;
    assert_eq!(per_tick_units, 9_984_000);

    let ticks = 10_u32;
    for _ in 0..ticks {
        // Stay short of the upkeep due time so only sales run.
        cartel
            .run_dealer_automation(TENANT, T0 + 60, 300)
            .expect("automation");
    }

    let dealer = cartel
        .store_mut()
        .dealer(TENANT, &dealer_id)
        .expect("read")
        .expect("dealer");
    let total_units = per_tick_units * u128::from(ticks);
    let expected_chips = (total_units / CHIP_VALUE_UNITS as u128) as u64;
    let expected_remainder = (total_units % CHIP_VALUE_UNITS as u128) as u64;
    assert_eq!(dealer.pending_chips, expected_chips);
    assert_eq!(dealer.chip_remainder_units, expected_remainder);
    assert_eq!(dealer.pending_mg, 416 * u64::from(ticks));
    assert_eq!(dealer.lifetime_sold_mg, 416 * u64::from(ticks));

    let owner = cartel
        .store_mut()
        .investor(TENANT, OWNER)
        .expect("investor");
    assert_eq!(owner.stash_mg, 2_000_000 - 416 * u64::from(ticks));
}

#[test]
fn lapsed_upkeep_pauses_the_dealer_when_owner_is_broke() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel
        .store_mut()
        .set_holdings(TENANT, OWNER, 500_000, 0)
        .expect("stash");

    // Past the due time with an empty wallet: the dealer pauses and does
    // not sell this tick.
    let after_due = T0 + 3_700;
    cartel
        .run_dealer_automation(TENANT, after_due, 300)
        .expect("automation");

    let dealer = cartel
        .store_mut()
        .dealer(TENANT, &dealer_id)
        .expect("read")
        .expect("dealer");
    assert_eq!(dealer.status, DealerStatus::Paused);
    assert_eq!(dealer.pending_mg, 0);
    let owner = cartel
        .store_mut()
        .investor(TENANT, OWNER)
        .expect("investor");
    assert_eq!(owner.stash_mg, 500_000);
}

#[test]
fn lapsed_upkeep_auto_charges_a_funded_owner() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel.store_mut().credit_user(TENANT, OWNER, 100);
    cartel
        .store_mut()
        .set_holdings(TENANT, OWNER, 500_000, 0)
        .expect("stash");

    let after_due = T0 + 3_700;
    cartel
        .run_dealer_automation(TENANT, after_due, 300)
        .expect("automation");

    let dealer = cartel
        .store_mut()
        .dealer(TENANT, &dealer_id)
        .expect("read")
        .expect("dealer");
    assert_eq!(dealer.status, DealerStatus::Active);
    // Lookout upkeep is 6 chips per hour; the auto charge buys a full hour.
    assert_eq!(cartel.store().user_balance(TENANT, OWNER), 94);
    assert_eq!(dealer.upkeep_due_at, after_due + 3_600);
    // Selling resumed in the same pass.
    assert!(dealer.pending_mg > 0);
}

#[test]
fn manual_upkeep_extends_from_the_later_of_now_and_due() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel.store_mut().credit_user(TENANT, OWNER, 100);

    // 6 chips buy exactly one hour for a Lookout; paid before the current
    // due time, it stacks on top of it.
    let receipt = cartel
        .pay_dealer_upkeep(TENANT, OWNER, &dealer_id, 6, T0 + 100)
        .expect("upkeep");
    assert_eq!(receipt.seconds_purchased, 3_600);
    assert_eq!(receipt.dealer.upkeep_due_at, T0 + 3_600 + 3_600);
    assert_eq!(receipt.dealer.status, DealerStatus::Active);

    let err = cartel
        .pay_dealer_upkeep(TENANT, OWNER, &dealer_id, 0, T0 + 100)
        .expect_err("zero chips");
    assert!(matches!(err, CartelError::UpkeepAmountRequired));
}

#[test]
fn collect_gathers_all_pending_and_awards_xp_once() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel.store_mut().fund_house(TENANT, 10_000);
    cartel
        .store_mut()
        .add_dealer_pending(TENANT, &dealer_id, 30, 1_500_000)
        .expect("pending");

    let receipt = cartel
        .collect_dealer_chips(TENANT, OWNER, T0)
        .expect("collect");
    assert_eq!(receipt.total_chips, 30);
    assert_eq!(receipt.total_mg, 1_500_000);
    // 1,500 grams at 2 XP per gram.
    assert_eq!(receipt.xp_gain, 3_000);
    assert_eq!(receipt.dealers_collected, 1);
    // 3,000 XP crosses the rank 1, 2, and 3 thresholds (150 + 462 + 1,422).
    assert_eq!(receipt.rank, 4);
    assert_eq!(receipt.rank_xp, 966);

    let dealer = cartel
        .store_mut()
        .dealer(TENANT, &dealer_id)
        .expect("read")
        .expect("dealer");
    assert_eq!(dealer.pending_chips, 0);
    assert_eq!(dealer.pending_mg, 0);

    let err = cartel
        .collect_dealer_chips(TENANT, OWNER, T0)
        .expect_err("nothing left");
    assert!(matches!(err, CartelError::NoDealerChips));
}

#[test]
fn firing_forfeits_pending_chips() {
    let mut cartel = new_cartel();
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    cartel
        .store_mut()
        .add_dealer_pending(TENANT, &dealer_id, 123, 456)
        .expect("pending");

    let fired = cartel
        .fire_dealer(TENANT, OWNER, &dealer_id, T0)
        .expect("fire");
    assert_eq!(fired.pending_chips, 123);
    assert!(cartel
        .store_mut()
        .dealer(TENANT, &dealer_id)
        .expect("read")
        .is_none());

    let err = cartel
        .fire_all_dealers(TENANT, OWNER, T0)
        .expect_err("none left");
    assert!(matches!(err, CartelError::NoDealers));

    // Wrong-owner lookups report the dealer as missing.
    let dealer_id = hire_lookout(&mut cartel, 1_000);
    let err = cartel
        .fire_dealer(TENANT, "mallory", &dealer_id, T0)
        .expect_err("not the owner");
    assert!(matches!(err, CartelError::DealerNotFound));
}
