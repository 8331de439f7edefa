//! Errors for `execore-chainspec`.

/// A [`Result`] type alias where the error is [`ChainSpecError`].
pub type ChainSpecResult<T> = Result<T, ChainSpecError>;

/// An error type for gas-limit and base-fee validation.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ChainSpecError {
    /// The header's gas limit is below the protocol minimum.
    #[error("gas limit {gas_limit} below minimum of {min}", min = crate::MIN_GAS_LIMIT)]
    GasLimitTooLow {
        /// The rejected gas limit.
        gas_limit: u64,
    },
    /// The header's gas limit moved by too much relative to its parent.
    #[error(
        "gas limit {gas_limit} deviates from parent {parent_gas_limit} by >= bound {bound}"
    )]
    GasLimitDelta {
        /// The rejected gas limit.
        gas_limit: u64,
        /// The (possibly elasticity-adjusted) parent gas limit it was checked against.
        parent_gas_limit: u64,
        /// The maximum allowed absolute delta, exclusive.
        bound: u64,
    },
    /// The header's base fee does not match the value derived from its parent.
    #[error("base fee {actual} does not match derived value {expected}")]
    BaseFeeMismatch {
        /// The header's declared base fee.
        actual: u64,
        /// The base fee derived from the parent.
        expected: u64,
    },
}
