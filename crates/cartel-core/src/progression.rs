//! Rank progression: stash capacity and XP thresholds over ten fixed tiers.
//!
//! The XP curve is geometric from 150 XP (rank 1 to 2) up to 1,210,560 XP
//! (rank 9 to 10); rank 10 is terminal. All lookups clamp their inputs, so
//! out-of-range stored state normalizes instead of panicking.

use std::sync::OnceLock;

use contracts::{RankTableEntry, MAX_RANK, MG_PER_GRAM};

const STASH_CAP_GRAMS_BY_RANK: [u64; MAX_RANK as usize] =
    [100, 175, 275, 400, 600, 850, 1_150, 1_550, 2_000, 2_500];

const XP_CURVE_START: u64 = 150;
const XP_CURVE_END: u64 = 1_210_560;

fn build_xp_curve() -> [u64; MAX_RANK as usize] {
    let steps = (MAX_RANK - 1) as usize;
    let ratio = (XP_CURVE_END as f64 / XP_CURVE_START as f64).powf(1.0 / (steps as f64 - 1.0));
    let mut values = [0_u64; MAX_RANK as usize];
    for (idx, value) in values.iter_mut().enumerate().take(steps) {
        *value = if idx == 0 {
            XP_CURVE_START
        } else if idx == steps - 1 {
            XP_CURVE_END
        } else {
            let raw = XP_CURVE_START as f64 * ratio.powi(idx as i32);
            (raw.round() as u64).max(XP_CURVE_START)
        };
    }
    // The final slot stays 0: max rank has no further requirement.
    values
}

fn xp_curve() -> &'static [u64; MAX_RANK as usize] {
    static CURVE: OnceLock<[u64; MAX_RANK as usize]> = OnceLock::new();
    CURVE.get_or_init(build_xp_curve)
}

fn rank_index(rank: u32) -> usize {
    let clamped = rank.clamp(1, MAX_RANK);
    (clamped - 1) as usize
}

pub fn stash_cap_grams_for_rank(rank: u32) -> u64 {
    STASH_CAP_GRAMS_BY_RANK[rank_index(rank)]
}

pub fn stash_cap_mg_for_rank(rank: u32) -> u64 {
    stash_cap_grams_for_rank(rank) * MG_PER_GRAM
}

/// XP needed to advance from `rank` to the next rank; 0 at max rank.
pub fn xp_to_next_for_rank(rank: u32) -> u64 {
    xp_curve()[rank_index(rank)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankProgress {
    pub rank: u32,
    pub rank_xp: u64,
}

/// Adds `xp_gain` and walks the investor up the curve. Idempotent with
/// `xp_gain = 0`, which callers use to normalize stored state after a
/// historical curve change.
pub fn apply_rank_progress(rank: u32, rank_xp: u64, xp_gain: u64) -> RankProgress {
    let mut rank = rank.clamp(1, MAX_RANK);
    let mut xp = rank_xp.saturating_add(xp_gain);
    while rank < MAX_RANK {
        let needed = xp_to_next_for_rank(rank);
        if needed == 0 || xp < needed {
            break;
        }
        xp -= needed;
        rank += 1;
    }
    if rank >= MAX_RANK {
        rank = MAX_RANK;
        xp = 0;
    }
    RankProgress { rank, rank_xp: xp }
}

pub fn rank_xp_table() -> Vec<RankTableEntry> {
    let mut cumulative = 0_u64;
    (1..=MAX_RANK)
        .map(|rank| {
            let xp_to_next = xp_to_next_for_rank(rank);
            let entry = RankTableEntry {
                rank,
                xp_to_next,
                xp_to_reach: cumulative,
                stash_cap_grams: stash_cap_grams_for_rank(rank),
            };
            cumulative += xp_to_next;
            entry
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_endpoints_are_exact() {
        assert_eq!(xp_to_next_for_rank(1), 150);
        assert_eq!(xp_to_next_for_rank(9), 1_210_560);
        assert_eq!(xp_to_next_for_rank(10), 0);
    }

    #[test]
    fn curve_is_strictly_increasing_below_max() {
        for rank in 1..MAX_RANK - 1 {
            assert!(
                xp_to_next_for_rank(rank) < xp_to_next_for_rank(rank + 1),
                "rank {rank} threshold should be below rank {}",
                rank + 1
            );
        }
    }

    #[test]
    fn lookups_clamp_degenerate_ranks() {
        assert_eq!(stash_cap_grams_for_rank(0), 100);
        assert_eq!(stash_cap_grams_for_rank(99), 2_500);
        assert_eq!(stash_cap_mg_for_rank(1), 100_000);
        assert_eq!(xp_to_next_for_rank(0), 150);
    }

    #[test]
    fn progress_steps_through_multiple_ranks() {
        // 150 advances rank 1 to 2 exactly, leaving 0 XP.
        let progressed = apply_rank_progress(1, 0, 150);
        assert_eq!(progressed, RankProgress { rank: 2, rank_xp: 0 });

        // A large grant walks up several thresholds and keeps the remainder.
        let threshold_2 = xp_to_next_for_rank(2);
        let threshold_3 = xp_to_next_for_rank(3);
        let progressed = apply_rank_progress(1, 0, 150 + threshold_2 + threshold_3 + 7);
        assert_eq!(progressed.rank, 4);
        assert_eq!(progressed.rank_xp, 7);
    }

    #[test]
    fn max_rank_clamps_and_zeroes_xp() {
        let progressed = apply_rank_progress(10, 12_345, 0);
        assert_eq!(progressed, RankProgress { rank: 10, rank_xp: 0 });

        let total: u64 = (1..MAX_RANK).map(xp_to_next_for_rank).sum();
        let progressed = apply_rank_progress(1, 0, total + 999);
        assert_eq!(progressed, RankProgress { rank: 10, rank_xp: 0 });
    }

    #[test]
    fn zero_gain_normalizes_overshoot_state() {
        // Stored XP above the current threshold promotes even with no gain.
        let progressed = apply_rank_progress(1, 200, 0);
        assert_eq!(progressed.rank, 2);
        assert_eq!(progressed.rank_xp, 50);
    }

    #[test]
    fn table_accumulates_thresholds() {
        let table = rank_xp_table();
        assert_eq!(table.len(), 10);
        assert_eq!(table[0].xp_to_reach, 0);
        assert_eq!(table[1].xp_to_reach, 150);
        assert_eq!(table[9].xp_to_next, 0);
        assert_eq!(table[9].stash_cap_grams, 2_500);
    }
}
