/// Number of finishing positions in a draw.
pub const DRAW_POSITIONS: usize = 10;

/// Entrant numbers range over 1..=MAX_ENTRANT.
pub const MAX_ENTRANT: u8 = 10;

/// Single-position size threshold: an entrant number >= this is Big.
pub const POSITION_BIG_MIN: u8 = 6;

/// Sum-of-top-two size threshold: a sum >= this is Big.
///
/// Distinct from the single-position threshold; the sum of the 1st- and
/// 2nd-place entrant numbers ranges over 3..=19.
pub const SUM_BIG_MIN: u8 = 12;

/// Smallest possible sum of the top two entrant numbers (1 + 2).
pub const SUM_MIN: u8 = 3;

/// Largest possible sum of the top two entrant numbers (9 + 10).
pub const SUM_MAX: u8 = 19;

/// Table odds for a position-number bet, centi-multiplier (9.89x).
pub const ODDS_POSITION_NUMBER_CENTI: u32 = 989;

/// Table odds for every size/parity bet family, centi-multiplier (1.98x).
pub const ODDS_SIZE_PARITY_CENTI: u32 = 198;

/// Table odds for an exact-sum bet, centi-multiplier.
///
/// Follows the pair counts of two distinct picks from 1..=10 (90 ordered
/// pairs total) with a 10% house margin: the rarer the sum, the higher the
/// multiplier. Returns `None` outside 3..=19.
pub fn sum_value_odds_centi(value: u8) -> Option<u32> {
    match value {
        3 | 4 | 18 | 19 => Some(4050),  // 2 of 90 pairs
        5 | 6 | 16 | 17 => Some(2025),  // 4 of 90
        7 | 8 | 14 | 15 => Some(1350),  // 6 of 90
        9 | 10 | 12 | 13 => Some(1012), // 8 of 90
        11 => Some(810),                // 10 of 90
        _ => None,
    }
}

/// Rebate pool cap for the standard market tier, basis points (1.1%).
pub const POOL_CAP_STANDARD_BP: u16 = 110;

/// Rebate pool cap for the premium market tier, basis points (4.1%).
pub const POOL_CAP_PREMIUM_BP: u16 = 410;

/// Maximum agent-chain depth walked during rebate distribution.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Maximum length of a period identifier.
pub const MAX_PERIOD_LEN: usize = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_odds_cover_full_range() {
        for value in SUM_MIN..=SUM_MAX {
            assert!(sum_value_odds_centi(value).is_some(), "sum {value} missing odds");
        }
        assert_eq!(sum_value_odds_centi(2), None);
        assert_eq!(sum_value_odds_centi(20), None);
    }

    #[test]
    fn test_extreme_sums_pay_more_than_central() {
        let extreme = sum_value_odds_centi(3).unwrap();
        let central = sum_value_odds_centi(11).unwrap();
        assert!(extreme > 4 * central);
    }
}
