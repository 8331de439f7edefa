//! Errors for `execore-trie`.

/// A [`Result`] type alias where the error is [`TrieError`].
pub type TrieResult<T> = Result<T, TrieError>;

/// An error type for [`crate::HexaryTrie`] operations.
#[derive(thiserror::Error, Debug)]
pub enum TrieError {
    /// The underlying KV store returned an error.
    #[error("kv store error: {0}")]
    Kv(#[from] execore_kv::KvError),
    /// A node referenced by hash was missing from the KV store.
    #[error("missing trie node for digest {0}")]
    MissingNode(alloy_primitives::B256),
    /// A node's RLP encoding could not be decoded.
    #[error("failed to decode trie node: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}
