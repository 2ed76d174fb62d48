//! Integer money arithmetic.
//!
//! Intermediates widen to i128; rounding to whole cents is half-up and
//! happens exactly once, at the point a balance is credited.

/// Payout for a stake at centi-odds, rounded half-up to whole cents.
///
/// Odds are stake-inclusive: a 100.00 stake at 9.89x pays 989.00, not 889.00.
pub fn apply_odds_cents(stake_cents: i64, odds_centi: u32) -> i64 {
    let numerator = i128::from(stake_cents) * i128::from(odds_centi);
    ((numerator + 50) / 100) as i64
}

/// Basis-point share of a stake, rounded half-up to whole cents.
pub fn take_basis_points_cents(stake_cents: i64, bp: u16) -> i64 {
    let numerator = i128::from(stake_cents) * i128::from(bp);
    ((numerator + 5_000) / 10_000) as i64
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_payout_includes_stake() {
        // 100.00 at 9.89x pays exactly 989.00.
        assert_eq!(apply_odds_cents(10_000, 989), 98_900);
        // 50.00 at 1.98x pays 99.00.
        assert_eq!(apply_odds_cents(5_000, 198), 9_900);
    }

    #[test]
    fn test_payout_rounds_half_up() {
        // 0.33 at 9.89x = 3.2637 -> 3.26
        assert_eq!(apply_odds_cents(33, 989), 326);
        // 0.50 at 1.01x = 0.505 -> 0.51
        assert_eq!(apply_odds_cents(50, 101), 51);
    }

    #[test]
    fn test_basis_points_exact_on_round_stakes() {
        // 1000.00 at 0.5% = 5.00, at 0.6% = 6.00.
        assert_eq!(take_basis_points_cents(100_000, 50), 500);
        assert_eq!(take_basis_points_cents(100_000, 60), 600);
        // 150.00 at 1.1% = 1.65.
        assert_eq!(take_basis_points_cents(15_000, 110), 165);
    }

    #[test]
    fn test_basis_points_rounds_half_up() {
        // 0.01 at 1.1% = 0.00011 -> 0.00
        assert_eq!(take_basis_points_cents(1, 110), 0);
        // 4.55 at 1.1% = 0.05005 -> 0.05
        assert_eq!(take_basis_points_cents(455, 110), 5);
    }

    proptest! {
        #[test]
        fn prop_basis_points_never_exceed_stake(stake in 1i64..1_000_000_000, bp in 0u16..=10_000) {
            let share = take_basis_points_cents(stake, bp);
            prop_assert!(share >= 0);
            prop_assert!(share <= stake);
        }
    }
}
