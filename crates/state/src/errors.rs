//! Errors for `execore-state`.

/// A [`Result`] type alias where the error is [`StateError`].
pub type StateResult<T> = Result<T, StateError>;

/// An error type for [`crate::AccountsCache`] operations.
#[derive(thiserror::Error, Debug)]
pub enum StateError {
    /// The underlying trie returned an error.
    #[error("trie error: {0}")]
    Trie(#[from] execore_trie::TrieError),
    /// A stored account or storage slot could not be RLP-decoded.
    #[error("failed to decode account: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// A snapshot was reverted or committed out of order.
    #[error("snapshot {given} is newer than the current depth {current}")]
    InvalidSnapshot {
        /// The snapshot id the caller attempted to revert/commit to.
        given: usize,
        /// The current journal depth.
        current: usize,
    },
}
