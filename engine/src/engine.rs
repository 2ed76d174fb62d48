//! The per-period settlement orchestrator.
//!
//! One entry point settles a period: lock, evaluate, pay, mark, commit.
//! Rebate distribution and reconciliation funnel through the same idempotent
//! operations, so every repair path observes the same guards as the inline
//! path.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use gridline_types::{
    apply_odds_cents, ActorKind, ChainAgent, DrawResult, DrawResultError, PeriodId, RecordKind,
    TransactionRecord, MAX_CHAIN_DEPTH,
};

use crate::cache::DrawCache;
use crate::rebate::allocate_chain;
use crate::store::{Store, StoreError, StoreTx};
use crate::{evaluator, resolver};

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("invalid draw result: {0}")]
    InvalidDraw(#[from] DrawResultError),
    #[error("settlement lock contention; retry")]
    LockTimeout,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SettleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => SettleError::LockTimeout,
            other => SettleError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RebateError {
    #[error("rebate lock contention; retry")]
    LockTimeout,
    #[error("member {member_id} not found")]
    MissingMember { member_id: i64 },
    #[error("agent {agent_id} not found")]
    MissingAgent { agent_id: i64 },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RebateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => RebateError::LockTimeout,
            other => RebateError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("bet {id} not found")]
    UnknownBet { id: i64 },
    #[error("bet {id} is not settled; corrections only apply after settlement")]
    NotSettled { id: i64 },
    #[error("correction payout must not be negative (got {payout_cents})")]
    NegativePayout { payout_cents: i64 },
    #[error("correction lock contention; retry")]
    LockTimeout,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for CorrectionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout => CorrectionError::LockTimeout,
            other => CorrectionError::Store(other),
        }
    }
}

/// Outcome of one period settlement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettlementSummary {
    pub settled: u32,
    pub wins: u32,
    /// Bets flagged for manual review (unresolvable or invariant-violating).
    pub review: u32,
    pub total_payout_cents: i64,
}

/// Outcome of one rebate distribution pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebateSummary {
    /// Member chains paid in this pass.
    pub members: u32,
    /// Individual agent credits written.
    pub credited: u32,
    pub total_cents: i64,
    /// Member chains that failed; left for the next reconcile pass.
    pub failed_members: u32,
    /// True when every settled member already had rebate rows.
    pub already_distributed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No settled bets for the period.
    NothingSettled,
    /// Every settled member already has rebate rows.
    Clean,
    Repaired(RebateSummary),
}

/// Outcome of a reconciliation sweep over recently settled periods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    pub clean: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// The settlement transaction engine.
///
/// Owns the draw cache; all persistent state lives in the injected [`Store`].
/// Multiple engine instances (and processes) may run against the same
/// database: correctness comes from the per-period transaction plus the
/// rebate-record guard, not from in-process exclusivity.
pub struct SettlementEngine {
    cache: DrawCache,
}

impl SettlementEngine {
    pub fn new(cache: DrawCache) -> Self {
        Self { cache }
    }

    /// Settle every unsettled bet for the draw's period, exactly once.
    ///
    /// State machine per period: Unsettled -> Settling -> Settled, where
    /// Settling exists only inside the transaction below. A crash before
    /// commit leaves every bet unsettled and the call safe to retry; a retry
    /// after commit finds zero unsettled rows and reduces to a
    /// reconciliation check (a duplicate attempt is a successful no-op).
    pub fn settle_period(
        &mut self,
        store: &mut Store,
        draw: &DrawResult,
        now_ms: u64,
    ) -> Result<SettlementSummary, SettleError> {
        draw.validate()?;
        let period = draw.period.clone();
        let cached = self.cache.get(&period).is_some();

        let mut tx = store.begin()?;
        if !cached && !tx.insert_draw_result(draw)? {
            debug!(period = %period, "Draw result already recorded");
        }
        let bets = tx.lock_unsettled_bets(&period)?;

        if bets.is_empty() {
            tx.commit()?;
            if !cached {
                self.cache.insert(draw.clone());
            }
            debug!(period = %period, "No unsettled bets; running reconciliation guard");
            if let Err(err) = self.reconcile(store, &period, now_ms) {
                error!(period = %period, error = %err, "Reconciliation after empty settlement failed");
            }
            return Ok(SettlementSummary::default());
        }

        let mut summary = SettlementSummary::default();
        for bet in &bets {
            if let Err(err) = bet.check_invariants() {
                warn!(bet = bet.id, error = %err, "Bet fails invariants; flagged for review");
                tx.mark_bet_settled(bet.id, false, 0, true, now_ms)?;
                summary.settled += 1;
                summary.review += 1;
                continue;
            }
            match resolver::resolve(&bet.bet_type, &bet.bet_value, bet.position) {
                Err(err) => {
                    // Never abort the batch over one unresolvable bet.
                    warn!(bet = bet.id, error = %err, "Unresolvable bet flagged for review");
                    tx.mark_bet_settled(bet.id, false, 0, true, now_ms)?;
                    summary.settled += 1;
                    summary.review += 1;
                }
                Ok(rule) => {
                    let evaluation = evaluator::evaluate(&rule, draw);
                    if evaluation.win {
                        let odds_centi = if bet.odds_centi > 0 {
                            bet.odds_centi
                        } else {
                            evaluation.multiplier_centi
                        };
                        let payout_cents = apply_odds_cents(bet.stake_cents, odds_centi);
                        let before = tx.member_balance(bet.member_id)?;
                        let after = before + payout_cents;
                        tx.set_member_balance(bet.member_id, after)?;
                        tx.insert_record(&TransactionRecord {
                            id: 0,
                            actor: ActorKind::Member,
                            actor_id: bet.member_id,
                            kind: RecordKind::Win,
                            amount_cents: payout_cents,
                            balance_before_cents: before,
                            balance_after_cents: after,
                            period: Some(period.clone()),
                            member_id: Some(bet.member_id),
                            description: format!("win bet {}: {}", bet.id, evaluation.explanation),
                            created_at_ms: now_ms,
                        })?;
                        tx.mark_bet_settled(bet.id, true, payout_cents, false, now_ms)?;
                        summary.wins += 1;
                        summary.total_payout_cents += payout_cents;
                    } else {
                        tx.mark_bet_settled(bet.id, false, 0, false, now_ms)?;
                    }
                    summary.settled += 1;
                }
            }
        }
        tx.commit()?;
        if !cached {
            self.cache.insert(draw.clone());
        }
        info!(
            period = %period,
            settled = summary.settled,
            wins = summary.wins,
            review = summary.review,
            payout_cents = summary.total_payout_cents,
            "Settled period"
        );

        // Rebate failure never unwinds the committed settlement; the next
        // reconcile pass repairs it.
        if let Err(err) = self.distribute_rebates(store, &period, now_ms) {
            error!(period = %period, error = %err, "Rebate distribution failed; reconciliation will repair");
        }
        Ok(summary)
    }

    /// Distribute the capped rebate pool for a settled period.
    ///
    /// Safe to call any number of times: members that already have rebate
    /// rows for the period are skipped, so repeated calls converge to one net
    /// effect and a half-distributed period completes instead of doubling.
    pub fn distribute_rebates(
        &mut self,
        store: &mut Store,
        period: &PeriodId,
        now_ms: u64,
    ) -> Result<RebateSummary, RebateError> {
        let (stakes, rebated) = {
            let mut tx = store.begin()?;
            let stakes = tx.settled_stake_by_member(period)?;
            // Step one of the guard: any rebate rows at all for this period?
            let rebated = if tx.has_rebate_records(period)? {
                tx.rebated_member_ids(period)?
            } else {
                Vec::new()
            };
            tx.commit()?;
            (stakes, rebated)
        };
        if stakes.is_empty() {
            debug!(period = %period, "No settled stake to rebate");
            return Ok(RebateSummary::default());
        }

        let rebated: HashSet<i64> = rebated.into_iter().collect();
        let pending: Vec<(i64, i64)> = stakes
            .into_iter()
            .filter(|(member_id, _)| !rebated.contains(member_id))
            .collect();
        if pending.is_empty() {
            debug!(period = %period, "Rebates already distributed");
            return Ok(RebateSummary {
                already_distributed: true,
                ..RebateSummary::default()
            });
        }

        let mut summary = RebateSummary::default();
        for (member_id, stake_cents) in pending {
            match self.distribute_member_chain(store, period, member_id, stake_cents, now_ms) {
                Ok((credited, total_cents)) => {
                    summary.members += 1;
                    summary.credited += credited;
                    summary.total_cents += total_cents;
                }
                Err(err) => {
                    // One member's chain failure must not block the others.
                    error!(period = %period, member = member_id, error = %err, "Rebate chain failed");
                    summary.failed_members += 1;
                }
            }
        }
        info!(
            period = %period,
            members = summary.members,
            credited = summary.credited,
            total_cents = summary.total_cents,
            failed = summary.failed_members,
            "Distributed rebates"
        );
        Ok(summary)
    }

    /// One member's chain: all credits and audit rows in one transaction.
    fn distribute_member_chain(
        &mut self,
        store: &mut Store,
        period: &PeriodId,
        member_id: i64,
        stake_cents: i64,
        now_ms: u64,
    ) -> Result<(u32, i64), RebateError> {
        let mut tx = store.begin()?;
        // Re-check under the write lock; a concurrent distributor may have
        // paid this member between the read pass and here.
        if tx.has_member_rebate(period, member_id)? {
            return Ok((0, 0));
        }
        let chain = resolve_chain(&mut tx, member_id)?;
        if chain.is_empty() {
            debug!(period = %period, member = member_id, "Member has no agent chain");
            return Ok((0, 0));
        }
        let mut credited = 0u32;
        let mut total_cents = 0i64;
        for allocation in allocate_chain(stake_cents, &chain) {
            if allocation.amount_cents == 0 {
                continue;
            }
            let before = tx.agent_balance(allocation.agent_id)?;
            let after = before + allocation.amount_cents;
            tx.set_agent_balance(allocation.agent_id, after)?;
            tx.insert_record(&TransactionRecord {
                id: 0,
                actor: ActorKind::Agent,
                actor_id: allocation.agent_id,
                kind: RecordKind::Rebate,
                amount_cents: allocation.amount_cents,
                balance_before_cents: before,
                balance_after_cents: after,
                period: Some(period.clone()),
                member_id: Some(member_id),
                description: format!(
                    "rebate {}bp of member {member_id} stake",
                    allocation.used_bp
                ),
                created_at_ms: now_ms,
            })?;
            credited += 1;
            total_cents += allocation.amount_cents;
        }
        tx.commit()?;
        Ok((credited, total_cents))
    }

    /// Check-and-repair: a period with settled members missing rebate rows
    /// gets distribution re-run through the same guarded path.
    pub fn reconcile(
        &mut self,
        store: &mut Store,
        period: &PeriodId,
        now_ms: u64,
    ) -> Result<ReconcileOutcome, RebateError> {
        let (settled, stakes, rebated) = {
            let mut tx = store.begin()?;
            let settled = tx.has_settled_bets(period)?;
            let stakes = tx.settled_stake_by_member(period)?;
            let rebated = tx.rebated_member_ids(period)?;
            tx.commit()?;
            (settled, stakes, rebated)
        };
        if !settled {
            return Ok(ReconcileOutcome::NothingSettled);
        }
        let rebated: HashSet<i64> = rebated.into_iter().collect();
        if stakes.iter().all(|(member_id, _)| rebated.contains(member_id)) {
            return Ok(ReconcileOutcome::Clean);
        }
        info!(period = %period, "Settled period missing rebates; repairing");
        let summary = self.distribute_rebates(store, period, now_ms)?;
        Ok(ReconcileOutcome::Repaired(summary))
    }

    /// Sweep every period settled inside the window and reconcile each.
    ///
    /// Belt-and-braces for the inline reconcile call: a settlement path that
    /// died between commit and distribution still gets repaired here.
    pub fn reconcile_recent(
        &mut self,
        store: &mut Store,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<SweepSummary, RebateError> {
        let since_ms = now_ms.saturating_sub(window_ms);
        let periods = {
            let mut tx = store.begin()?;
            let periods = tx.recently_settled_periods(since_ms)?;
            tx.commit()?;
            periods
        };
        let mut summary = SweepSummary {
            scanned: periods.len(),
            ..SweepSummary::default()
        };
        for period in periods {
            match self.reconcile(store, &period, now_ms) {
                Ok(ReconcileOutcome::Repaired(_)) => summary.repaired += 1,
                Ok(_) => summary.clean += 1,
                Err(err) => {
                    error!(period = %period, error = %err, "Sweep reconcile failed");
                    summary.failed += 1;
                }
            }
        }
        info!(
            scanned = summary.scanned,
            clean = summary.clean,
            repaired = summary.repaired,
            failed = summary.failed,
            "Reconciliation sweep complete"
        );
        Ok(summary)
    }

    /// The only sanctioned mutation of a settled bet: adjust its outcome,
    /// apply the balance delta, and leave a correction audit row, all in one
    /// transaction.
    pub fn correct_bet(
        &mut self,
        store: &mut Store,
        bet_id: i64,
        win: bool,
        payout_cents: i64,
        reason: &str,
        now_ms: u64,
    ) -> Result<(), CorrectionError> {
        if payout_cents < 0 {
            return Err(CorrectionError::NegativePayout { payout_cents });
        }
        let mut tx = store.begin()?;
        let bet = tx
            .bet(bet_id)?
            .ok_or(CorrectionError::UnknownBet { id: bet_id })?;
        if !bet.settled {
            return Err(CorrectionError::NotSettled { id: bet_id });
        }
        let delta_cents = payout_cents - bet.payout_cents;
        tx.update_bet_outcome(bet_id, win, payout_cents)?;
        let before = tx.member_balance(bet.member_id)?;
        let after = before + delta_cents;
        tx.set_member_balance(bet.member_id, after)?;
        tx.insert_record(&TransactionRecord {
            id: 0,
            actor: ActorKind::Member,
            actor_id: bet.member_id,
            kind: RecordKind::Correction,
            amount_cents: delta_cents,
            balance_before_cents: before,
            balance_after_cents: after,
            period: Some(bet.period.clone()),
            member_id: Some(bet.member_id),
            description: format!("bet {bet_id} correction: {reason}"),
            created_at_ms: now_ms,
        })?;
        tx.commit()?;
        info!(bet = bet_id, delta_cents, "Applied bet correction");
        Ok(())
    }
}

fn resolve_chain(tx: &mut StoreTx<'_>, member_id: i64) -> Result<Vec<ChainAgent>, RebateError> {
    let member = tx
        .member(member_id)?
        .ok_or(RebateError::MissingMember { member_id })?;
    let mut chain = Vec::new();
    let mut next = Some(member.agent_id);
    while let Some(agent_id) = next {
        if chain.len() >= MAX_CHAIN_DEPTH {
            warn!(member = member_id, depth = chain.len(), "Agent chain depth cap reached");
            break;
        }
        let agent = tx
            .agent(agent_id)?
            .ok_or(RebateError::MissingAgent { agent_id })?;
        chain.push(ChainAgent {
            agent_id: agent.id,
            level: agent.level,
            rebate_bp: agent.rebate_bp,
            pool_cap_bp: agent.market.pool_cap_bp(),
        });
        next = agent.parent_id;
    }
    Ok(chain)
}
