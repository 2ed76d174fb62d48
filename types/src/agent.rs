use thiserror::Error;

use super::{POOL_CAP_PREMIUM_BP, POOL_CAP_STANDARD_BP};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown market {value:?}")]
pub struct MarketParseError {
    pub value: String,
}

/// Market tier an agent operates under; selects the rebate pool cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Market {
    Standard,
    Premium,
}

impl Market {
    pub fn pool_cap_bp(&self) -> u16 {
        match self {
            Market::Standard => POOL_CAP_STANDARD_BP,
            Market::Premium => POOL_CAP_PREMIUM_BP,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Standard => "standard",
            Market::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Result<Self, MarketParseError> {
        match value {
            "standard" => Ok(Market::Standard),
            "premium" => Ok(Market::Premium),
            other => Err(MarketParseError {
                value: other.to_string(),
            }),
        }
    }
}

/// A node in the commission hierarchy.
///
/// `rebate_bp` is the agent's own earning rate on downline stake; the chain
/// walk clamps cumulative allocation to the market's pool cap, so an
/// overconfigured chain degrades to zero allocations rather than negative
/// ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Agent {
    pub id: i64,
    pub username: String,
    pub parent_id: Option<i64>,
    pub level: u32,
    pub market: Market,
    pub rebate_bp: u16,
    pub balance_cents: i64,
}

/// A player account. Creation and bet-placement debits happen upstream; the
/// settlement core only credits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub username: String,
    pub balance_cents: i64,
    pub agent_id: i64,
}

/// One resolved entry of a member's ancestor chain, ordered direct agent
/// first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainAgent {
    pub agent_id: i64,
    pub level: u32,
    pub rebate_bp: u16,
    pub pool_cap_bp: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_round_trip() {
        for market in [Market::Standard, Market::Premium] {
            assert_eq!(Market::parse(market.as_str()).unwrap(), market);
        }
        assert!(Market::parse("vip").is_err());
    }

    #[test]
    fn test_pool_caps() {
        assert_eq!(Market::Standard.pool_cap_bp(), 110);
        assert_eq!(Market::Premium.pool_cap_bp(), 410);
    }
}
