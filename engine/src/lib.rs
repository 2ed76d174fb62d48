//! Gridline settlement engine.
//!
//! The transactional core of the platform: resolves raw bet tokens to
//! canonical rules, evaluates them against a finalized draw, settles each
//! period exactly once, cascades capped rebates up the agent hierarchy, and
//! repairs settled-but-unrebated periods.
//!
//! ## Correctness invariants
//! - A period's bets settle inside one database transaction; a crash
//!   mid-settlement leaves them unsettled and the whole call safe to retry.
//! - No balance ever changes without an audit row in the same transaction.
//! - Rebate distribution is keyed off existing audit rows for the canonical
//!   period text; repeated calls have at most one net effect.
//! - There is exactly one settlement entry point,
//!   [`SettlementEngine::settle_period`]; every repair path funnels through
//!   the same idempotent operations.
//!
//! The primary entrypoint is [`SettlementEngine`].

mod cache;
mod engine;
pub mod evaluator;
pub mod rebate;
pub mod resolver;
mod store;


pub use cache::DrawCache;
pub use engine::{
    CorrectionError, RebateError, RebateSummary, ReconcileOutcome, SettleError, SettlementEngine,
    SettlementSummary, SweepSummary,
};
pub use evaluator::{evaluate, Evaluation};
pub use rebate::{allocate_chain, Allocation};
pub use resolver::{resolve, UnknownBetType};
pub use store::{Store, StoreError, StoreTx};
