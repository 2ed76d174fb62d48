//! Bet-type resolution.
//!
//! Raw bet tokens arrive in two vocabularies: positional-name form
//! ("champion"/"冠军" + a value token) and generic form ("number"/"号码" + an
//! explicit position field). Values mix digits with bilingual size/parity
//! words. One table maps every known surface form to a canonical [`BetRule`];
//! anything else is an explicit [`UnknownBetType`], which settlement treats
//! as "flag for manual review", never as a reason to abort a period.

use thiserror::Error;

use gridline_types::{BetRule, Parity, Size, MAX_ENTRANT, SUM_MAX, SUM_MIN};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown bet type/value combination (type={bet_type:?}, value={bet_value:?})")]
pub struct UnknownBetType {
    pub bet_type: String,
    pub bet_value: String,
}

enum TypeToken {
    /// A named or generic single-position family.
    Position(Option<u8>),
    /// A per-position size/parity family; needs the explicit position field.
    PositionSide,
    /// The champion/runner-up sum family.
    Sum,
}

enum ValueToken {
    Number(u8),
    Size(Size),
    Parity(Parity),
}

fn classify_type(token: &str) -> Option<TypeToken> {
    let named = match token {
        "冠军" | "冠軍" | "champion" | "first" | "1st" => Some(1),
        "亚军" | "亞軍" | "runner-up" | "runner_up" | "second" | "2nd" => Some(2),
        "季军" | "季軍" | "第三名" | "third" | "3rd" => Some(3),
        "第四名" | "fourth" | "4th" => Some(4),
        "第五名" | "fifth" | "5th" => Some(5),
        "第六名" | "sixth" | "6th" => Some(6),
        "第七名" | "seventh" | "7th" => Some(7),
        "第八名" | "eighth" | "8th" => Some(8),
        "第九名" | "ninth" | "9th" => Some(9),
        "第十名" | "tenth" | "10th" => Some(10),
        _ => None,
    };
    if named.is_some() {
        return Some(TypeToken::Position(named));
    }
    match token {
        "number" | "号码" | "號碼" => Some(TypeToken::Position(None)),
        "size" | "大小" | "parity" | "单双" | "單雙" | "odd-even" | "odd_even" => {
            Some(TypeToken::PositionSide)
        }
        "sum" | "冠亚和" | "冠亞和" | "冠亚和值" | "guanyahe" => Some(TypeToken::Sum),
        _ => None,
    }
}

fn classify_value(token: &str, max_number: u8) -> Option<ValueToken> {
    if let Ok(number) = token.parse::<u8>() {
        if number >= 1 && number <= max_number {
            return Some(ValueToken::Number(number));
        }
        return None;
    }
    match token {
        "big" | "大" => Some(ValueToken::Size(Size::Big)),
        "small" | "小" => Some(ValueToken::Size(Size::Small)),
        "odd" | "单" | "單" => Some(ValueToken::Parity(Parity::Odd)),
        "even" | "双" | "雙" => Some(ValueToken::Parity(Parity::Even)),
        _ => None,
    }
}

fn unknown(bet_type: &str, bet_value: &str) -> UnknownBetType {
    UnknownBetType {
        bet_type: bet_type.to_string(),
        bet_value: bet_value.to_string(),
    }
}

/// Resolve raw bet tokens to a canonical evaluation rule.
///
/// `position` is the generic form's explicit position field; a named
/// positional type wins over it when both are present.
pub fn resolve(
    bet_type: &str,
    bet_value: &str,
    position: Option<u8>,
) -> Result<BetRule, UnknownBetType> {
    let type_token = bet_type.trim().to_lowercase();
    let value_token = bet_value.trim().to_lowercase();

    match classify_type(&type_token) {
        Some(TypeToken::Sum) => {
            // Digit values are exact sums here, not entrant numbers.
            if let Ok(value) = value_token.parse::<u8>() {
                if (SUM_MIN..=SUM_MAX).contains(&value) {
                    return Ok(BetRule::SumValue { value });
                }
                return Err(unknown(bet_type, bet_value));
            }
            match classify_value(&value_token, MAX_ENTRANT) {
                Some(ValueToken::Size(size)) => Ok(BetRule::SumSize { size }),
                Some(ValueToken::Parity(parity)) => Ok(BetRule::SumParity { parity }),
                _ => Err(unknown(bet_type, bet_value)),
            }
        }
        Some(TypeToken::Position(named)) => {
            let position = match named.or(position) {
                Some(p) if (1..=MAX_ENTRANT).contains(&p) => p,
                _ => return Err(unknown(bet_type, bet_value)),
            };
            match classify_value(&value_token, MAX_ENTRANT) {
                Some(ValueToken::Number(number)) => Ok(BetRule::PositionNumber { position, number }),
                Some(ValueToken::Size(size)) => Ok(BetRule::PositionSize { position, size }),
                Some(ValueToken::Parity(parity)) => Ok(BetRule::PositionParity { position, parity }),
                None => Err(unknown(bet_type, bet_value)),
            }
        }
        Some(TypeToken::PositionSide) => {
            let position = match position {
                Some(p) if (1..=MAX_ENTRANT).contains(&p) => p,
                _ => return Err(unknown(bet_type, bet_value)),
            };
            match classify_value(&value_token, MAX_ENTRANT) {
                Some(ValueToken::Size(size)) => Ok(BetRule::PositionSize { position, size }),
                Some(ValueToken::Parity(parity)) => Ok(BetRule::PositionParity { position, parity }),
                _ => Err(unknown(bet_type, bet_value)),
            }
        }
        None => Err(unknown(bet_type, bet_value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_position_forms() {
        assert_eq!(
            resolve("champion", "3", None).unwrap(),
            BetRule::PositionNumber { position: 1, number: 3 }
        );
        assert_eq!(
            resolve("冠军", "3", None).unwrap(),
            BetRule::PositionNumber { position: 1, number: 3 }
        );
        assert_eq!(
            resolve("冠軍", "大", None).unwrap(),
            BetRule::PositionSize { position: 1, size: Size::Big }
        );
        assert_eq!(
            resolve("亚军", "单", None).unwrap(),
            BetRule::PositionParity { position: 2, parity: Parity::Odd }
        );
        assert_eq!(
            resolve("第十名", "small", None).unwrap(),
            BetRule::PositionSize { position: 10, size: Size::Small }
        );
    }

    #[test]
    fn test_generic_form_needs_position() {
        assert_eq!(
            resolve("number", "7", Some(3)).unwrap(),
            BetRule::PositionNumber { position: 3, number: 7 }
        );
        assert_eq!(
            resolve("号码", "7", Some(3)).unwrap(),
            BetRule::PositionNumber { position: 3, number: 7 }
        );
        assert!(resolve("number", "7", None).is_err());
        assert!(resolve("number", "7", Some(11)).is_err());
    }

    #[test]
    fn test_named_position_wins_over_field() {
        // A stray position field must not override the named form.
        assert_eq!(
            resolve("champion", "3", Some(5)).unwrap(),
            BetRule::PositionNumber { position: 1, number: 3 }
        );
    }

    #[test]
    fn test_side_families() {
        assert_eq!(
            resolve("size", "big", Some(4)).unwrap(),
            BetRule::PositionSize { position: 4, size: Size::Big }
        );
        assert_eq!(
            resolve("单双", "雙", Some(2)).unwrap(),
            BetRule::PositionParity { position: 2, parity: Parity::Even }
        );
        assert!(resolve("size", "big", None).is_err());
        assert!(resolve("size", "7", Some(4)).is_err());
    }

    #[test]
    fn test_sum_forms() {
        assert_eq!(
            resolve("冠亚和", "大", None).unwrap(),
            BetRule::SumSize { size: Size::Big }
        );
        assert_eq!(
            resolve("sum", "odd", None).unwrap(),
            BetRule::SumParity { parity: Parity::Odd }
        );
        assert_eq!(
            resolve("冠亞和", "11", None).unwrap(),
            BetRule::SumValue { value: 11 }
        );
        assert_eq!(
            resolve("sum", "19", None).unwrap(),
            BetRule::SumValue { value: 19 }
        );
    }

    #[test]
    fn test_sum_value_range() {
        assert!(resolve("sum", "2", None).is_err());
        assert!(resolve("sum", "20", None).is_err());
    }

    #[test]
    fn test_tokens_are_normalized() {
        assert_eq!(
            resolve("  Champion ", " BIG ", None).unwrap(),
            BetRule::PositionSize { position: 1, size: Size::Big }
        );
    }

    #[test]
    fn test_unknown_combinations() {
        let err = resolve("trifecta", "3", None).unwrap_err();
        assert_eq!(err.bet_type, "trifecta");
        assert!(resolve("champion", "banana", None).is_err());
        assert!(resolve("champion", "11", None).is_err());
        assert!(resolve("", "", None).is_err());
    }
}
