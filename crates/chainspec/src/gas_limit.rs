//! Parent/child gas-limit bound validation.

use crate::{ChainSpecError, ChainSpecResult};

/// The protocol-minimum block gas limit.
pub const MIN_GAS_LIMIT: u64 = 5000;

/// Validates `gas_limit` against `effective_parent_limit` (already elasticity-adjusted by the
/// caller via [`crate::effective_parent_gas_limit`] when London is active): the limit must move
/// by strictly less than `1/1024` of the parent's, and never drop below [`MIN_GAS_LIMIT`].
pub fn validate_gas_limit(gas_limit: u64, effective_parent_limit: u64) -> ChainSpecResult<()> {
    if gas_limit < MIN_GAS_LIMIT {
        return Err(ChainSpecError::GasLimitTooLow { gas_limit });
    }

    let bound = effective_parent_limit / 1024;
    let delta = gas_limit.abs_diff(effective_parent_limit);
    if delta >= bound {
        return Err(ChainSpecError::GasLimitDelta {
            gas_limit,
            parent_gas_limit: effective_parent_limit,
            bound,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_unchanged_limit() {
        validate_gas_limit(30_000_000, 30_000_000).unwrap();
    }

    #[test]
    fn rejects_limit_below_minimum() {
        assert!(matches!(
            validate_gas_limit(4999, 30_000_000),
            Err(ChainSpecError::GasLimitTooLow { .. })
        ));
    }

    #[test]
    fn rejects_large_jump() {
        assert!(matches!(
            validate_gas_limit(60_000_000, 30_000_000),
            Err(ChainSpecError::GasLimitDelta { .. })
        ));
    }

    #[test]
    fn accepts_jump_just_under_bound() {
        let parent = 30_000_000;
        let bound = parent / 1024;
        validate_gas_limit(parent + bound - 1, parent).unwrap();
    }
}
