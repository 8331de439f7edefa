//! The fork activation schedule and gas-limit/base-fee validation.

#![warn(missing_debug_implementations, unreachable_pub)]

mod fork;
pub use fork::{ChainConfig, ForkId};

mod base_fee;
pub use base_fee::{
    effective_parent_gas_limit, next_base_fee, BASE_FEE_MAX_CHANGE_DENOMINATOR,
    ELASTICITY_MULTIPLIER, INITIAL_BASE_FEE,
};

mod gas_limit;
pub use gas_limit::{validate_gas_limit, MIN_GAS_LIMIT};

mod rewards;
pub use rewards::{base_block_reward, miner_ommer_inclusion_reward, ommer_author_reward};

mod errors;
pub use errors::{ChainSpecError, ChainSpecResult};
