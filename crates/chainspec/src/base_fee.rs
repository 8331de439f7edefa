//! EIP-1559 base fee derivation.

/// The base fee of the first London block.
pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;

/// `1 / BASE_FEE_MAX_CHANGE_DENOMINATOR` is the maximum fraction the base fee can move by, per
/// block, in either direction.
pub const BASE_FEE_MAX_CHANGE_DENOMINATOR: u128 = 8;

/// The gas-limit target is `gasLimit / ELASTICITY_MULTIPLIER`.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Derives the next block's base fee from its London+ parent.
///
/// If the parent used exactly the target gas, the base fee is unchanged; above target, it rises
/// (by at least 1 wei); below target, it falls (with no floor beyond zero).
pub fn next_base_fee(parent_gas_limit: u64, parent_gas_used: u64, parent_base_fee: u64) -> u64 {
    let target = (parent_gas_limit / ELASTICITY_MULTIPLIER).max(1) as u128;
    let parent_base_fee = parent_base_fee as u128;

    if parent_gas_used as u128 == target {
        return parent_base_fee as u64;
    }

    if parent_gas_used as u128 > target {
        let gas_used_delta = parent_gas_used as u128 - target;
        let delta = (parent_base_fee * gas_used_delta / target / BASE_FEE_MAX_CHANGE_DENOMINATOR)
            .max(1);
        parent_base_fee.saturating_add(delta) as u64
    } else {
        let gas_used_delta = target - parent_gas_used as u128;
        let delta = parent_base_fee * gas_used_delta / target / BASE_FEE_MAX_CHANGE_DENOMINATOR;
        parent_base_fee.saturating_sub(delta) as u64
    }
}

/// The effective parent gas limit to validate and derive fees against: doubled if this is the
/// first London block (the elasticity multiplier takes effect only once the parent itself is
/// subject to it).
pub const fn effective_parent_gas_limit(parent_gas_limit: u64, parent_was_london: bool) -> u64 {
    if parent_was_london {
        parent_gas_limit
    } else {
        parent_gas_limit.saturating_mul(ELASTICITY_MULTIPLIER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_fee_unchanged_at_target() {
        let fee = next_base_fee(30_000_000, 15_000_000, INITIAL_BASE_FEE);
        assert_eq!(fee, INITIAL_BASE_FEE);
    }

    #[test]
    fn base_fee_rises_above_target() {
        let fee = next_base_fee(30_000_000, 30_000_000, INITIAL_BASE_FEE);
        assert!(fee > INITIAL_BASE_FEE);
    }

    #[test]
    fn base_fee_falls_below_target() {
        let fee = next_base_fee(30_000_000, 0, INITIAL_BASE_FEE);
        assert!(fee < INITIAL_BASE_FEE);
    }

    #[test]
    fn first_london_block_doubles_parent_limit() {
        assert_eq!(effective_parent_gas_limit(15_000_000, false), 30_000_000);
        assert_eq!(effective_parent_gas_limit(30_000_000, true), 30_000_000);
    }
}
