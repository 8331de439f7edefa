//! [`Account`] — the trie value: `nonce`, `balance`, `storageRoot`, `codeHash`.

use alloy_primitives::{B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use execore_trie::{EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};

/// An Ethereum account as represented in the accounts trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct Account {
    /// Number of transactions sent from this account (or, for contracts, number of
    /// contract-creations).
    pub nonce: u64,
    /// Account balance, in wei.
    pub balance: U256,
    /// Root of this account's storage trie.
    pub storage_root: B256,
    /// Keccak-256 hash of this account's code.
    pub code_hash: B256,
}

impl Account {
    /// An account is empty iff it has no nonce, no balance, and no code (EIP-161).
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_account_is_empty() {
        assert!(Account::default().is_empty());
    }

    #[test]
    fn nonzero_nonce_is_not_empty() {
        let account = Account { nonce: 1, ..Default::default() };
        assert!(!account.is_empty());
    }

    #[test]
    fn rlp_roundtrip() {
        use alloy_rlp::{Decodable, Encodable};

        let account = Account {
            nonce: 7,
            balance: U256::from(1_000_u64),
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
        };
        let mut buf = Vec::new();
        account.encode(&mut buf);
        let decoded = Account::decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, account);
    }
}
