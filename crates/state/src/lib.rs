//! The accounts cache: a mutable in-memory view over an accounts trie and per-account storage
//! tries, with dirty tracking, an EIP-2929 access list, and hierarchical snapshot/revert matching
//! EVM call-frame nesting.

#![warn(missing_debug_implementations, unreachable_pub)]

mod account;
pub use account::Account;

mod cache;
pub use cache::{AccountsCache, SnapshotId};

mod errors;
pub use errors::{StateError, StateResult};

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};
    use execore_kv::MemoryKv;
    use execore_trie::EMPTY_TRIE_ROOT;

    #[test]
    fn absent_account_reads_as_default() {
        let mut kv = MemoryKv::new();
        let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
        let addr = address!("0000000000000000000000000000000000000001");
        assert_eq!(cache.get_account(addr).unwrap(), Account::default());
    }

    #[test]
    fn set_balance_then_persist_round_trips() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");

        let root = {
            let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
            cache.set_balance(addr, U256::from(100_u64)).unwrap();
            cache.persist(false).unwrap()
        };

        let mut cache = AccountsCache::new(&mut kv, root);
        assert_eq!(cache.get_account(addr).unwrap().balance, U256::from(100_u64));
    }

    #[test]
    fn revert_undoes_balance_change() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");
        let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);

        cache.set_balance(addr, U256::from(10_u64)).unwrap();
        let snap = cache.snapshot();
        cache.set_balance(addr, U256::from(20_u64)).unwrap();
        cache.revert(snap).unwrap();

        assert_eq!(cache.get_account(addr).unwrap().balance, U256::from(10_u64));
    }

    #[test]
    fn nested_snapshot_commit_keeps_outer_revert_working() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");
        let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);

        let outer = cache.snapshot();
        cache.set_balance(addr, U256::from(10_u64)).unwrap();
        let inner = cache.snapshot();
        cache.set_balance(addr, U256::from(20_u64)).unwrap();
        cache.commit(inner).unwrap();
        cache.revert(outer).unwrap();

        assert_eq!(cache.get_account(addr).unwrap().balance, U256::ZERO);
    }

    #[test]
    fn storage_round_trips_through_persist() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");
        let key = U256::from(7_u64);

        let root = {
            let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
            cache.set_balance(addr, U256::from(1_u64)).unwrap();
            cache.set_storage(addr, key, U256::from(42_u64)).unwrap();
            cache.persist(false).unwrap()
        };

        let mut cache = AccountsCache::new(&mut kv, root);
        assert_eq!(cache.get_storage(addr, key).unwrap(), U256::from(42_u64));
    }

    #[test]
    fn empty_touched_account_is_reaped_post_spurious_dragon() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");

        let root = {
            let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
            cache.set_balance(addr, U256::from(1_u64)).unwrap();
            cache.set_balance(addr, U256::ZERO).unwrap();
            cache.mark_touched(addr);
            cache.persist(true).unwrap()
        };

        assert_eq!(root, EMPTY_TRIE_ROOT);
    }

    #[test]
    fn self_destruct_credits_beneficiary() {
        let mut kv = MemoryKv::new();
        let addr = address!("0000000000000000000000000000000000000001");
        let beneficiary = address!("0000000000000000000000000000000000000002");

        let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
        cache.set_balance(addr, U256::from(50_u64)).unwrap();
        cache.self_destruct(addr, beneficiary).unwrap();

        assert_eq!(cache.get_account(addr).unwrap().balance, U256::ZERO);
        assert_eq!(cache.get_account(beneficiary).unwrap().balance, U256::from(50_u64));
    }

    #[test]
    fn warm_address_reports_cold_exactly_once() {
        let mut kv = MemoryKv::new();
        let mut cache = AccountsCache::new(&mut kv, EMPTY_TRIE_ROOT);
        let addr = address!("0000000000000000000000000000000000000001");

        assert!(cache.warm_address(addr));
        assert!(!cache.warm_address(addr));
        assert!(cache.is_warm_address(addr));
    }
}
