use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PeriodId, DRAW_POSITIONS, MAX_ENTRANT};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawResultError {
    #[error("draw must contain exactly {expected} positions (got {got})")]
    WrongLength { got: usize, expected: usize },
    #[error("entrant number out of range (got {got})")]
    OutOfRange { got: u8 },
    #[error("entrant number {number} appears more than once")]
    Duplicate { number: u8 },
}

/// The finalized outcome for a period: which entrant finished in each rank.
///
/// `positions[0]` is the 1st-place entrant number, `positions[1]` the 2nd,
/// and so on. A valid draw is a permutation of 1..=10. Produced exactly once
/// per period by an external generator and immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub period: PeriodId,
    pub positions: Vec<u8>,
    pub drawn_at_ms: u64,
}

impl DrawResult {
    /// Build a validated draw result from a raw position sequence.
    pub fn new(
        period: PeriodId,
        positions: Vec<u8>,
        drawn_at_ms: u64,
    ) -> Result<Self, DrawResultError> {
        let draw = Self {
            period,
            positions,
            drawn_at_ms,
        };
        draw.validate()?;
        Ok(draw)
    }

    /// Check the permutation invariant.
    ///
    /// Deserialized or store-loaded draws must pass through here before any
    /// bet is evaluated against them.
    pub fn validate(&self) -> Result<(), DrawResultError> {
        if self.positions.len() != DRAW_POSITIONS {
            return Err(DrawResultError::WrongLength {
                got: self.positions.len(),
                expected: DRAW_POSITIONS,
            });
        }
        let mut seen = [false; DRAW_POSITIONS];
        for &number in &self.positions {
            if number < 1 || number > MAX_ENTRANT {
                return Err(DrawResultError::OutOfRange { got: number });
            }
            let slot = usize::from(number - 1);
            if seen[slot] {
                return Err(DrawResultError::Duplicate { number });
            }
            seen[slot] = true;
        }
        Ok(())
    }

    /// Entrant number that finished in `position` (1-based rank).
    pub fn entrant(&self, position: u8) -> Option<u8> {
        if position == 0 {
            return None;
        }
        self.positions.get(usize::from(position - 1)).copied()
    }

    /// Sum of the 1st- and 2nd-place entrant numbers (3..=19 for a valid draw).
    pub fn front_sum(&self) -> u8 {
        self.positions.first().copied().unwrap_or(0) + self.positions.get(1).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> PeriodId {
        PeriodId::new("20240801-1").unwrap()
    }

    #[test]
    fn test_valid_permutation() {
        let draw = DrawResult::new(period(), vec![3, 6, 1, 2, 4, 5, 7, 8, 9, 10], 0).unwrap();
        assert_eq!(draw.entrant(1), Some(3));
        assert_eq!(draw.entrant(10), Some(10));
        assert_eq!(draw.front_sum(), 9);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            DrawResult::new(period(), vec![1, 2, 3], 0),
            Err(DrawResultError::WrongLength { got: 3, expected: 10 })
        );
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(
            DrawResult::new(period(), vec![0, 2, 3, 4, 5, 6, 7, 8, 9, 10], 0),
            Err(DrawResultError::OutOfRange { got: 0 })
        );
        assert_eq!(
            DrawResult::new(period(), vec![11, 2, 3, 4, 5, 6, 7, 8, 9, 10], 0),
            Err(DrawResultError::OutOfRange { got: 11 })
        );
    }

    #[test]
    fn test_rejects_duplicates() {
        assert_eq!(
            DrawResult::new(period(), vec![1, 1, 3, 4, 5, 6, 7, 8, 9, 10], 0),
            Err(DrawResultError::Duplicate { number: 1 })
        );
    }

    #[test]
    fn test_entrant_out_of_range_is_none() {
        let draw = DrawResult::new(period(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10], 0).unwrap();
        assert_eq!(draw.entrant(0), None);
        assert_eq!(draw.entrant(11), None);
    }

    #[test]
    fn test_feed_round_trip() {
        let json = r#"{"period":"20240801-1","positions":[3,6,1,2,4,5,7,8,9,10],"drawn_at_ms":1722500000000}"#;
        let draw: DrawResult = serde_json::from_str(json).unwrap();
        draw.validate().unwrap();
        assert_eq!(draw.front_sum(), 9);
    }
}
