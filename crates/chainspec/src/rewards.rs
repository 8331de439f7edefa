//! Block and ommer rewards.

use crate::ForkId;
use alloy_primitives::U256;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// The miner's base block reward for `fork`: 5 ETH pre-Byzantium, 3 ETH Byzantium-Constantinople,
/// 2 ETH Constantinople-Paris, 0 from Paris (the Merge) onward.
pub fn base_block_reward(fork: ForkId) -> U256 {
    let ether = if fork >= ForkId::Paris {
        0
    } else if fork >= ForkId::Constantinople {
        2
    } else if fork >= ForkId::Byzantium {
        3
    } else {
        5
    };
    U256::from(ether * WEI_PER_ETHER)
}

/// The miner's per-ommer inclusion bonus: `baseReward / 32`, for each ommer included.
pub fn miner_ommer_inclusion_reward(fork: ForkId, ommer_count: u64) -> U256 {
    (base_block_reward(fork) / U256::from(32u64)) * U256::from(ommer_count)
}

/// An ommer header's own author's reward: `baseReward * (8 + ommerNumber - blockNumber) / 8`.
/// Zero if the ommer is not within 6 blocks of its nephew (should not occur for a valid ommer).
pub fn ommer_author_reward(fork: ForkId, block_number: u64, ommer_block_number: u64) -> U256 {
    let numerator = 8i128 + ommer_block_number as i128 - block_number as i128;
    if numerator <= 0 {
        return U256::ZERO;
    }
    base_block_reward(fork) * U256::from(numerator as u128) / U256::from(8u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byzantium_base_reward_is_three_ether() {
        assert_eq!(base_block_reward(ForkId::Byzantium), U256::from(3u64) * U256::from(WEI_PER_ETHER));
    }

    #[test]
    fn post_merge_reward_is_zero() {
        assert_eq!(base_block_reward(ForkId::Paris), U256::ZERO);
        assert_eq!(base_block_reward(ForkId::Shanghai), U256::ZERO);
    }

    #[test]
    fn one_block_old_ommer_reward_matches_spec_example() {
        // Constantinople base reward is 2 ETH; an ommer at n-1 included in block n earns
        // 2 * 7/8 ETH.
        let reward = ommer_author_reward(ForkId::Constantinople, 100, 99);
        let expected = U256::from(2u64) * U256::from(WEI_PER_ETHER) * U256::from(7u64) / U256::from(8u64);
        assert_eq!(reward, expected);
    }

    #[test]
    fn miner_bonus_scales_with_ommer_count() {
        let single = miner_ommer_inclusion_reward(ForkId::Constantinople, 1);
        let double = miner_ommer_inclusion_reward(ForkId::Constantinople, 2);
        assert_eq!(double, single * U256::from(2u64));
    }
}
