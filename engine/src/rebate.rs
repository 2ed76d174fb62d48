//! Rebate pool allocation.
//!
//! Pure math for splitting a member's settled stake across their agent
//! chain. Each agent earns its own configured rate, clamped so the chain's
//! cumulative allocation never exceeds the market's pool cap; whatever the
//! chain leaves unclaimed stays with the platform.

use gridline_types::{take_basis_points_cents, ChainAgent};

/// One agent's share of a member's stake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allocation {
    pub agent_id: i64,
    pub level: u32,
    /// Basis points actually used after pool clamping.
    pub used_bp: u16,
    pub amount_cents: i64,
}

/// Allocate the capped rebate pool across a chain, direct agent first.
///
/// The direct agent's market selects the pool cap. An agent whose configured
/// rate exceeds what remains in the pool is clamped to the remainder; agents
/// past an exhausted pool receive exactly zero, never a negative allocation.
/// Cents rounding happens per allocation, at the credit boundary.
pub fn allocate_chain(stake_cents: i64, chain: &[ChainAgent]) -> Vec<Allocation> {
    let pool_cap_bp = match chain.first() {
        Some(direct) => direct.pool_cap_bp,
        None => return Vec::new(),
    };

    let mut remaining_bp = pool_cap_bp;
    let mut allocations = Vec::with_capacity(chain.len());
    for agent in chain {
        let used_bp = agent.rebate_bp.min(remaining_bp);
        remaining_bp -= used_bp;
        allocations.push(Allocation {
            agent_id: agent.agent_id,
            level: agent.level,
            used_bp,
            amount_cents: take_basis_points_cents(stake_cents, used_bp),
        });
    }
    allocations
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chain_agent(agent_id: i64, level: u32, rebate_bp: u16, pool_cap_bp: u16) -> ChainAgent {
        ChainAgent {
            agent_id,
            level,
            rebate_bp,
            pool_cap_bp,
        }
    }

    #[test]
    fn test_two_level_chain_fills_pool_exactly() {
        // 0.5% + 0.6% under a 1.1% cap on a 1000.00 stake: 5.00 and 6.00,
        // zero residual.
        let chain = vec![chain_agent(10, 2, 50, 110), chain_agent(11, 1, 60, 110)];
        let allocations = allocate_chain(100_000, &chain);
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].amount_cents, 500);
        assert_eq!(allocations[0].used_bp, 50);
        assert_eq!(allocations[1].amount_cents, 600);
        assert_eq!(allocations[1].used_bp, 60);
        let total: i64 = allocations.iter().map(|a| a.amount_cents).sum();
        assert_eq!(total, 1_100);
    }

    #[test]
    fn test_overconfigured_ancestor_gets_zero() {
        // Direct agent consumes the whole pool; the ancestor gets exactly 0.
        let chain = vec![chain_agent(10, 2, 110, 110), chain_agent(11, 1, 60, 110)];
        let allocations = allocate_chain(100_000, &chain);
        assert_eq!(allocations[0].amount_cents, 1_100);
        assert_eq!(allocations[1].used_bp, 0);
        assert_eq!(allocations[1].amount_cents, 0);
    }

    #[test]
    fn test_overconfigured_direct_agent_is_clamped() {
        let chain = vec![chain_agent(10, 1, 500, 110)];
        let allocations = allocate_chain(100_000, &chain);
        assert_eq!(allocations[0].used_bp, 110);
        assert_eq!(allocations[0].amount_cents, 1_100);
    }

    #[test]
    fn test_residual_stays_with_platform() {
        // 0.3% configured under a 1.1% cap: 0.8% is simply not distributed.
        let chain = vec![chain_agent(10, 1, 30, 110)];
        let allocations = allocate_chain(100_000, &chain);
        assert_eq!(allocations[0].amount_cents, 300);
    }

    #[test]
    fn test_empty_chain() {
        assert!(allocate_chain(100_000, &[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_pool_cap_never_exceeded(
            stake in 1i64..100_000_000,
            rates in proptest::collection::vec(0u16..1_000, 0..8),
            cap in 0u16..1_000,
        ) {
            let chain: Vec<ChainAgent> = rates
                .iter()
                .enumerate()
                .map(|(idx, &bp)| chain_agent(idx as i64 + 1, idx as u32, bp, cap))
                .collect();
            let allocations = allocate_chain(stake, &chain);

            let used: u32 = allocations.iter().map(|a| u32::from(a.used_bp)).sum();
            prop_assert!(used <= u32::from(cap));
            for (allocation, agent) in allocations.iter().zip(&chain) {
                prop_assert!(allocation.used_bp <= agent.rebate_bp);
                prop_assert!(allocation.amount_cents >= 0);
            }
        }
    }
}
