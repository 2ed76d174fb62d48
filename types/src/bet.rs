use thiserror::Error;

use super::PeriodId;

/// Big/small side of a size bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Size {
    Big,
    Small,
}

/// Odd/even side of a parity bet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    Odd,
    Even,
}

/// A canonical evaluation rule, resolved from the raw bet-type/value tokens.
///
/// Position rules compare against the entrant number that finished in one
/// rank; sum rules compare against the sum of the 1st- and 2nd-place entrant
/// numbers. The two families use different size thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BetRule {
    PositionNumber { position: u8, number: u8 },
    PositionSize { position: u8, size: Size },
    PositionParity { position: u8, parity: Parity },
    SumSize { size: Size },
    SumParity { parity: Parity },
    SumValue { value: u8 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BetInvariantError {
    #[error("bet {id} stake must be positive (got {stake_cents})")]
    NonPositiveStake { id: i64, stake_cents: i64 },
    #[error("bet {id} is unsettled but carries an outcome")]
    UnsettledOutcome { id: i64 },
}

/// One wager on one outcome for one period.
///
/// The raw `bet_type`/`bet_value` tokens are kept as placed; resolution to a
/// [`BetRule`] happens at settlement time. `odds_centi == 0` means the bet
/// carries no placement-time price and settles at table odds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bet {
    pub id: i64,
    pub member_id: i64,
    pub period: PeriodId,
    pub bet_type: String,
    pub bet_value: String,
    pub position: Option<u8>,
    pub stake_cents: i64,
    pub odds_centi: u32,
    pub settled: bool,
    pub win: bool,
    pub payout_cents: i64,
    pub needs_review: bool,
    pub settled_at_ms: Option<u64>,
}

impl Bet {
    /// Check the row invariants: positive stake, and no outcome before
    /// settlement.
    pub fn check_invariants(&self) -> Result<(), BetInvariantError> {
        if self.stake_cents <= 0 {
            return Err(BetInvariantError::NonPositiveStake {
                id: self.id,
                stake_cents: self.stake_cents,
            });
        }
        if !self.settled && (self.win || self.payout_cents != 0) {
            return Err(BetInvariantError::UnsettledOutcome { id: self.id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsettled(stake_cents: i64) -> Bet {
        Bet {
            id: 1,
            member_id: 7,
            period: PeriodId::new("20240801-1").unwrap(),
            bet_type: "champion".to_string(),
            bet_value: "3".to_string(),
            position: None,
            stake_cents,
            odds_centi: 989,
            settled: false,
            win: false,
            payout_cents: 0,
            needs_review: false,
            settled_at_ms: None,
        }
    }

    #[test]
    fn test_invariants_hold_for_fresh_bet() {
        unsettled(10_000).check_invariants().unwrap();
    }

    #[test]
    fn test_rejects_non_positive_stake() {
        assert!(matches!(
            unsettled(0).check_invariants(),
            Err(BetInvariantError::NonPositiveStake { .. })
        ));
    }

    #[test]
    fn test_rejects_outcome_before_settlement() {
        let mut bet = unsettled(10_000);
        bet.payout_cents = 500;
        assert!(matches!(
            bet.check_invariants(),
            Err(BetInvariantError::UnsettledOutcome { id: 1 })
        ));
    }
}
