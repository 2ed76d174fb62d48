//! Domain types for the gridline settlement core.
//!
//! Everything the settlement engine and its embedders share: period
//! identifiers, draw results, bets and their canonical evaluation rules,
//! the agent hierarchy, audit records, and the odds/threshold constants.
//!
//! Monetary policy: amounts are integer cents (`i64`), odds are
//! centi-multipliers (`989` = 9.89x, stake-inclusive), and rebate rates are
//! basis points (`u16`). Rounding to whole cents happens only at the point a
//! balance is credited.

mod agent;
mod bet;
mod constants;
mod draw;
mod money;
mod period;
mod record;

pub use agent::{Agent, ChainAgent, Market, MarketParseError, Member};
pub use bet::{Bet, BetInvariantError, BetRule, Parity, Size};
pub use constants::*;
pub use draw::{DrawResult, DrawResultError};
pub use money::{apply_odds_cents, take_basis_points_cents};
pub use period::{PeriodId, PeriodIdError};
pub use record::{ActorKind, RecordKind, RecordKindParseError, TransactionRecord};
