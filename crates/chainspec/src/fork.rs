//! [`ForkId`] and [`ChainConfig`] — the fork activation schedule.

/// A named Ethereum mainnet consensus-rule set, ordered chronologically. Declaration order is
/// activation order: derived [`Ord`] lets callers write `fork >= ForkId::London` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForkId {
    /// The genesis rule set.
    Frontier,
    /// EIP-2/EIP-7/EIP-8.
    Homestead,
    /// The DAO fork (irregular state change, no new opcodes).
    Dao,
    /// EIP-150: repricing of IO-heavy opcodes.
    Tangerine,
    /// EIP-161/EIP-170: empty-account reaping, code size cap.
    SpuriousDragon,
    /// EIP-100/140/196/197/198/211/214/649/658: REVERT, STATICCALL, precompiles 0x06-0x08.
    Byzantium,
    /// EIP-145/1014/1052/1234/1283: CREATE2, SSTORE net-gas metering (superseded by Petersburg).
    Constantinople,
    /// Disables EIP-1283 (reinstated later under EIP-2200).
    Petersburg,
    /// EIP-152/1108/1344/1884/2028/2200: BLAKE2F, SSTORE EIP-2200, CHAINID, SELFBALANCE.
    Istanbul,
    /// Difficulty-bomb delay only; no opcode/gas changes.
    MuirGlacier,
    /// EIP-2565/2929/2718/2930: MODEXP repricing, cold/warm access lists, typed transactions.
    Berlin,
    /// EIP-1559/3198/3529/3541: base fee market, BASEFEE, refund cap halved, 0xEF code rejection.
    London,
    /// Difficulty-bomb delay only.
    ArrowGlacier,
    /// Difficulty-bomb delay only.
    GrayGlacier,
    /// The Merge: proof-of-stake consensus, block reward zeroed, DIFFICULTY repurposed as RANDOM.
    Paris,
    /// EIP-3651/3855/3860: warm coinbase, PUSH0, init code size cap. Forward-compatible hook —
    /// withdrawals and other Shanghai-only execution-layer behavior are out of scope here.
    Shanghai,
}

impl ForkId {
    /// Whether headers carry an EIP-1559 `baseFee` field and transactions may be type-2.
    pub const fn has_base_fee(self) -> bool {
        self as u8 >= Self::London as u8
    }

    /// Whether empty touched accounts are deleted at persist (EIP-161).
    pub const fn empty_account_reaping(self) -> bool {
        self as u8 >= Self::SpuriousDragon as u8
    }

    /// Whether EIP-2929/2930 access lists and cold/warm surcharges apply.
    pub const fn access_list_enabled(self) -> bool {
        self as u8 >= Self::Berlin as u8
    }

    /// The denominator of the refund cap: `gasUsed / 5` pre-London, `gasUsed / 2` from London.
    pub const fn refund_cap_denominator(self) -> u64 {
        if self as u8 >= Self::London as u8 {
            2
        } else {
            5
        }
    }

    /// The maximum deployed contract code size, if one is enforced (EIP-170, Spurious Dragon+).
    pub const fn max_code_size(self) -> Option<usize> {
        if self as u8 >= Self::SpuriousDragon as u8 {
            Some(24576)
        } else {
            None
        }
    }

    /// Whether deployed code starting with `0xEF` is rejected (EIP-3541, London+).
    pub const fn rejects_invalid_code_prefix(self) -> bool {
        self as u8 >= Self::London as u8
    }
}

/// An ordered fork-activation schedule plus the network identity the executor needs, passed into
/// the executor by reference — never read from global state, environment variables, or a config
/// file by this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// The chain id used to bind transaction signatures (EIP-155).
    pub chain_id: u64,
    /// The devp2p network id.
    pub network_id: u64,
    /// `(activationBlock, ForkId)` pairs, ascending by block number. Must start at block 0.
    pub fork_activations: Vec<(u64, ForkId)>,
    /// The base fee of the first London block.
    pub initial_base_fee: u64,
}

impl ChainConfig {
    /// The Ethereum mainnet fork schedule (chain id 1).
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            network_id: 1,
            fork_activations: vec![
                (0, ForkId::Frontier),
                (1_150_000, ForkId::Homestead),
                (1_920_000, ForkId::Dao),
                (2_463_000, ForkId::Tangerine),
                (2_675_000, ForkId::SpuriousDragon),
                (4_370_000, ForkId::Byzantium),
                (7_280_000, ForkId::Constantinople),
                (7_280_000, ForkId::Petersburg),
                (9_069_000, ForkId::Istanbul),
                (9_200_000, ForkId::MuirGlacier),
                (12_244_000, ForkId::Berlin),
                (12_965_000, ForkId::London),
                (13_773_000, ForkId::ArrowGlacier),
                (15_050_000, ForkId::GrayGlacier),
                (15_537_394, ForkId::Paris),
                (17_034_870, ForkId::Shanghai),
            ],
            initial_base_fee: super::INITIAL_BASE_FEE,
        }
    }

    /// Returns the fork active at `block_number`: the greatest fork whose activation block is
    /// `<= block_number`.
    pub fn fork_at(&self, block_number: u64) -> ForkId {
        self.fork_activations
            .iter()
            .rev()
            .find(|(activation, _)| *activation <= block_number)
            .map(|(_, fork)| *fork)
            .unwrap_or(ForkId::Frontier)
    }

    /// Whether `block_number` is the very first block at which `fork` is active.
    pub fn is_fork_activation_block(&self, fork: ForkId, block_number: u64) -> bool {
        self.fork_activations
            .iter()
            .find(|(_, f)| *f == fork)
            .is_some_and(|(activation, _)| *activation == block_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_at_genesis_is_frontier() {
        assert_eq!(ChainConfig::mainnet().fork_at(0), ForkId::Frontier);
    }

    #[test]
    fn fork_at_london_activation() {
        let config = ChainConfig::mainnet();
        assert_eq!(config.fork_at(12_965_000), ForkId::London);
        assert_eq!(config.fork_at(12_964_999), ForkId::Berlin);
    }

    #[test]
    fn first_london_block_is_activation_block() {
        let config = ChainConfig::mainnet();
        assert!(config.is_fork_activation_block(ForkId::London, 12_965_000));
        assert!(!config.is_fork_activation_block(ForkId::London, 12_965_001));
    }

    #[test]
    fn fork_feature_flags_follow_activation_order() {
        assert!(!ForkId::Berlin.has_base_fee());
        assert!(ForkId::London.has_base_fee());
        assert!(ForkId::Shanghai.has_base_fee());
        assert_eq!(ForkId::Berlin.refund_cap_denominator(), 5);
        assert_eq!(ForkId::London.refund_cap_denominator(), 2);
    }
}
