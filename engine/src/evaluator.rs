//! Win evaluation.
//!
//! Pure integer comparisons of a canonical [`BetRule`] against a validated
//! draw. The position and sum families use different size thresholds: an
//! entrant number (1..=10) is Big at >= 6, while the champion/runner-up sum
//! (3..=19) is Big at >= 12. Conflating the two silently inverts every sum
//! bet, so the thresholds live in named constants and are tested separately.

use gridline_types::{
    sum_value_odds_centi, BetRule, DrawResult, Parity, Size, ODDS_POSITION_NUMBER_CENTI,
    ODDS_SIZE_PARITY_CENTI, POSITION_BIG_MIN, SUM_BIG_MIN,
};

/// Outcome of evaluating one rule against one draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub win: bool,
    /// Table odds for the rule, centi-multiplier, stake-inclusive.
    pub multiplier_centi: u32,
    pub explanation: String,
}

fn size_of_position(number: u8) -> Size {
    if number >= POSITION_BIG_MIN {
        Size::Big
    } else {
        Size::Small
    }
}

fn size_of_sum(sum: u8) -> Size {
    if sum >= SUM_BIG_MIN {
        Size::Big
    } else {
        Size::Small
    }
}

fn parity_of(value: u8) -> Parity {
    if value % 2 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    }
}

/// Evaluate a rule against a draw.
///
/// The draw must already have passed [`DrawResult::validate`]; settlement
/// aborts before this point on a malformed draw. A rule referencing a
/// position outside the draw evaluates as a loss rather than panicking.
pub fn evaluate(rule: &BetRule, draw: &DrawResult) -> Evaluation {
    match *rule {
        BetRule::PositionNumber { position, number } => match draw.entrant(position) {
            Some(got) => Evaluation {
                win: got == number,
                multiplier_centi: ODDS_POSITION_NUMBER_CENTI,
                explanation: format!("position {position} drew {got}, bet {number}"),
            },
            None => out_of_draw(position),
        },
        BetRule::PositionSize { position, size } => match draw.entrant(position) {
            Some(got) => Evaluation {
                win: size_of_position(got) == size,
                multiplier_centi: ODDS_SIZE_PARITY_CENTI,
                explanation: format!("position {position} drew {got} ({:?})", size_of_position(got)),
            },
            None => out_of_draw(position),
        },
        BetRule::PositionParity { position, parity } => match draw.entrant(position) {
            Some(got) => Evaluation {
                win: parity_of(got) == parity,
                multiplier_centi: ODDS_SIZE_PARITY_CENTI,
                explanation: format!("position {position} drew {got} ({:?})", parity_of(got)),
            },
            None => out_of_draw(position),
        },
        BetRule::SumSize { size } => {
            let sum = draw.front_sum();
            Evaluation {
                win: size_of_sum(sum) == size,
                multiplier_centi: ODDS_SIZE_PARITY_CENTI,
                explanation: format!("front sum {sum} ({:?})", size_of_sum(sum)),
            }
        }
        BetRule::SumParity { parity } => {
            let sum = draw.front_sum();
            Evaluation {
                win: parity_of(sum) == parity,
                multiplier_centi: ODDS_SIZE_PARITY_CENTI,
                explanation: format!("front sum {sum} ({:?})", parity_of(sum)),
            }
        }
        BetRule::SumValue { value } => {
            let sum = draw.front_sum();
            Evaluation {
                win: sum == value,
                // The resolver only emits 3..=19; an out-of-table value pays
                // nothing rather than panicking.
                multiplier_centi: sum_value_odds_centi(value).unwrap_or(0),
                explanation: format!("front sum {sum}, bet {value}"),
            }
        }
    }
}

fn out_of_draw(position: u8) -> Evaluation {
    Evaluation {
        win: false,
        multiplier_centi: 0,
        explanation: format!("position {position} outside draw"),
    }
}

#[cfg(test)]
mod tests {
    use gridline_types::PeriodId;

    use super::*;

    fn draw(positions: Vec<u8>) -> DrawResult {
        DrawResult::new(PeriodId::new("20240801-1").unwrap(), positions, 0).unwrap()
    }

    #[test]
    fn test_position_number() {
        let d = draw(vec![3, 6, 1, 2, 4, 5, 7, 8, 9, 10]);
        let win = evaluate(&BetRule::PositionNumber { position: 1, number: 3 }, &d);
        assert!(win.win);
        assert_eq!(win.multiplier_centi, 989);
        let lose = evaluate(&BetRule::PositionNumber { position: 2, number: 3 }, &d);
        assert!(!lose.win);
    }

    #[test]
    fn test_position_size_threshold() {
        // Position 1 drew 6: Big at the position threshold (>= 6).
        let d = draw(vec![6, 3, 1, 2, 4, 5, 7, 8, 9, 10]);
        assert!(evaluate(&BetRule::PositionSize { position: 1, size: Size::Big }, &d).win);
        assert!(!evaluate(&BetRule::PositionSize { position: 1, size: Size::Small }, &d).win);

        // Position 1 drew 5: Small.
        let d = draw(vec![5, 3, 1, 2, 4, 6, 7, 8, 9, 10]);
        assert!(!evaluate(&BetRule::PositionSize { position: 1, size: Size::Big }, &d).win);
        assert!(evaluate(&BetRule::PositionSize { position: 1, size: Size::Small }, &d).win);
    }

    #[test]
    fn test_sum_size_threshold_is_not_position_threshold() {
        // Sum 9 = 6 + 3: Small even though both a 6 and the sum exceed the
        // position threshold.
        let d = draw(vec![6, 3, 1, 2, 4, 5, 7, 8, 9, 10]);
        assert_eq!(d.front_sum(), 9);
        assert!(!evaluate(&BetRule::SumSize { size: Size::Big }, &d).win);
        assert!(evaluate(&BetRule::SumSize { size: Size::Small }, &d).win);
        assert!(evaluate(&BetRule::SumParity { parity: Parity::Odd }, &d).win);
        assert!(!evaluate(&BetRule::SumParity { parity: Parity::Even }, &d).win);

        // Sum 12 = 7 + 5: Big at the sum threshold (>= 12).
        let d = draw(vec![7, 5, 1, 2, 3, 4, 6, 8, 9, 10]);
        assert_eq!(d.front_sum(), 12);
        assert!(evaluate(&BetRule::SumSize { size: Size::Big }, &d).win);
        assert!(!evaluate(&BetRule::SumSize { size: Size::Small }, &d).win);

        // Sum 11 = 1 + 10: the largest Small sum.
        let d = draw(vec![1, 10, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(d.front_sum(), 11);
        assert!(evaluate(&BetRule::SumSize { size: Size::Small }, &d).win);
    }

    #[test]
    fn test_position_parity() {
        let d = draw(vec![4, 7, 1, 2, 3, 5, 6, 8, 9, 10]);
        assert!(evaluate(&BetRule::PositionParity { position: 1, parity: Parity::Even }, &d).win);
        assert!(evaluate(&BetRule::PositionParity { position: 2, parity: Parity::Odd }, &d).win);
    }

    #[test]
    fn test_sum_value() {
        let d = draw(vec![6, 5, 1, 2, 3, 4, 7, 8, 9, 10]);
        let hit = evaluate(&BetRule::SumValue { value: 11 }, &d);
        assert!(hit.win);
        assert_eq!(hit.multiplier_centi, 810);
        let miss = evaluate(&BetRule::SumValue { value: 12 }, &d);
        assert!(!miss.win);
        assert_eq!(miss.multiplier_centi, 1012);
    }

    #[test]
    fn test_extreme_sum_odds() {
        let d = draw(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let hit = evaluate(&BetRule::SumValue { value: 3 }, &d);
        assert!(hit.win);
        assert_eq!(hit.multiplier_centi, 4050);
    }

    #[test]
    fn test_out_of_draw_position_loses() {
        let d = draw(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let eval = evaluate(&BetRule::PositionNumber { position: 11, number: 1 }, &d);
        assert!(!eval.win);
        assert_eq!(eval.multiplier_centi, 0);
    }
}
