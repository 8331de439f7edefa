//! A Merkle-Patricia trie over a byte-keyed [`execore_kv::KvStore`].
//!
//! Two flavors are exposed:
//! - [`HexaryTrie`] is a persistent, mutable trie supporting `get`/`put`/`delete`, used for the
//!   accounts trie and each account's storage trie. Account/storage tries are always "secure"
//!   (keys are hashed with Keccak-256 before descending).
//! - [`ordered_trie_root`] builds a one-shot, index-keyed trie root for transactions and
//!   receipts, reusing [`alloy_trie::HashBuilder`] rather than hand-rolling an append-only trie.

#![warn(missing_debug_implementations, unreachable_pub)]

mod node;
pub use node::{NodeRef, TrieNode};

mod trie;
pub use trie::HexaryTrie;

mod errors;
pub use errors::{TrieError, TrieResult};

use alloy_primitives::{b256, B256};
use alloy_rlp::{BufMut, Encodable};
use alloy_trie::{HashBuilder, Nibbles};

/// Root hash of the empty trie: `keccak256(rlp(""))`.
pub const EMPTY_TRIE_ROOT: B256 =
    b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421");

/// Keccak-256 hash of empty contract code.
pub const EMPTY_CODE_HASH: B256 =
    b256!("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470");

/// Computes a trie root over `items`, keyed by their RLP-encoded index in the slice (used for
/// both the transactions root and the receipts root).
pub fn ordered_trie_root<T, F>(items: &[T], mut encode: F) -> B256
where
    F: FnMut(&T, &mut dyn BufMut),
{
    let mut index_buffer = Vec::new();
    let mut value_buffer = Vec::new();
    let mut hb = HashBuilder::default();

    let len = items.len();
    for i in 0..len {
        let index = adjust_index_for_rlp(i, len);

        index_buffer.clear();
        index.encode(&mut index_buffer);

        value_buffer.clear();
        encode(&items[index], &mut value_buffer);

        hb.add_leaf(Nibbles::unpack(&index_buffer), &value_buffer);
    }

    hb.root()
}

const fn adjust_index_for_rlp(i: usize, len: usize) -> usize {
    if i > 0x7f {
        i
    } else if i == 0x7f || i + 1 == len {
        0
    } else {
        i + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ordered_trie_is_empty_root() {
        let items: Vec<Vec<u8>> = vec![];
        let root = ordered_trie_root(&items, |item, buf| buf.put_slice(item));
        assert_eq!(root, EMPTY_TRIE_ROOT);
    }
}
