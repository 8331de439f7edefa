//! [`BlockContext`] — the block-wide environment opcodes read (`COINBASE`, `NUMBER`, ...).

use alloy_primitives::{map::HashMap, Address, U256};

/// The subset of a block header (plus chain identity) the interpreter's environment opcodes
/// read. Block hashes are supplied as a lookup over the 256 most recent ancestors, matching
/// `BLOCKHASH`'s window.
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// The chain id (`CHAINID`, EIP-1344).
    pub chain_id: u64,
    /// The beneficiary of block and transaction rewards (`COINBASE`).
    pub coinbase: Address,
    /// The block's Unix timestamp (`TIMESTAMP`).
    pub timestamp: u64,
    /// The block number (`NUMBER`).
    pub number: u64,
    /// Pre-Merge: the PoW difficulty. Post-Merge: `prevRandao` (`DIFFICULTY`/EIP-4399).
    pub difficulty: U256,
    /// The block's gas limit (`GASLIMIT`).
    pub gas_limit: u64,
    /// The EIP-1559 base fee, present from London onward (`BASEFEE`).
    pub base_fee: Option<u64>,
    /// Hashes of the 256 most recent ancestor blocks, keyed by block number (`BLOCKHASH`).
    pub recent_block_hashes: HashMap<u64, alloy_primitives::B256>,
}

impl BlockContext {
    /// Looks up the hash of ancestor block `number`, per `BLOCKHASH`'s rule: defined only for the
    /// 256 most recent ancestors (strictly before the current block), zero otherwise.
    pub fn block_hash(&self, number: u64) -> alloy_primitives::B256 {
        if number >= self.number || self.number.saturating_sub(number) > 256 {
            return alloy_primitives::B256::ZERO;
        }
        self.recent_block_hashes.get(&number).copied().unwrap_or_default()
    }
}
