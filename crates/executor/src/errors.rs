//! Errors for `execore-executor`.

use alloy_primitives::{SignatureError, B256, U256};

/// A [`Result`] type alias where the error is [`TxError`].
pub type TxResult<T> = Result<T, TxError>;

/// An error that rejects a transaction before (or instead of) running it through the
/// interpreter. Distinct from an in-frame [`execore_evm::EvmError`], which the transaction still
/// pays gas for; these reject the transaction outright.
#[derive(thiserror::Error, Debug)]
pub enum TxError {
    /// The transaction's signature does not recover to a valid sender.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    /// The transaction's type is not one this executor processes.
    #[error("unsupported transaction type")]
    UnsupportedType,
    /// The transaction declares a chain id that does not match the chain being executed.
    #[error("chain id {tx} does not match expected {expected}")]
    ChainIdMismatch {
        /// The chain id the transaction declares.
        tx: u64,
        /// The chain id of the chain being executed.
        expected: u64,
    },
    /// The transaction's nonce does not match the sender account's current nonce.
    #[error("nonce mismatch: account has {account}, transaction specifies {tx}")]
    InvalidNonce {
        /// The sender account's current nonce.
        account: u64,
        /// The nonce the transaction specifies.
        tx: u64,
    },
    /// The sender's balance cannot cover `gasLimit * gasPrice + value`.
    #[error("sender balance {balance} insufficient for upfront cost {cost}")]
    InsufficientBalance {
        /// The sender's balance.
        balance: U256,
        /// The required upfront cost.
        cost: U256,
    },
    /// The transaction's gas limit is below its intrinsic gas cost.
    #[error("intrinsic gas {required} exceeds transaction gas limit {limit}")]
    IntrinsicGasTooLow {
        /// The computed intrinsic gas requirement.
        required: u64,
        /// The transaction's declared gas limit.
        limit: u64,
    },
    /// The transaction's gas limit would exceed the block's remaining gas.
    #[error("transaction gas limit {tx_limit} exceeds block's remaining gas {block_remaining}")]
    GasLimitExceeded {
        /// The transaction's declared gas limit.
        tx_limit: u64,
        /// The gas remaining in the block before this transaction.
        block_remaining: u64,
    },
    /// An EIP-1559 transaction's `maxFeePerGas` is below the block's base fee.
    #[error("max fee per gas {max_fee} is below block base fee {base_fee}")]
    FeeTooLow {
        /// The transaction's `maxFeePerGas`.
        max_fee: u64,
        /// The block's base fee.
        base_fee: u64,
    },
    /// An EIP-1559 transaction's `maxPriorityFeePerGas` exceeds its `maxFeePerGas`.
    #[error("max priority fee per gas {priority} exceeds max fee per gas {max_fee}")]
    PriorityFeeTooHigh {
        /// The transaction's `maxPriorityFeePerGas`.
        priority: u64,
        /// The transaction's `maxFeePerGas`.
        max_fee: u64,
    },
    /// A fatal failure of the interpreter's host environment while running the transaction.
    #[error(transparent)]
    Interpreter(#[from] execore_evm::InterpreterError),
}

/// A [`Result`] type alias where the error is [`BlockError`].
pub type BlockResult<T> = Result<T, BlockError>;

/// Which field of a block disagreed with what execution independently derived.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadBlockKind {
    /// The header's `logsBloom` does not match the one derived from receipts.
    #[error("logs bloom does not match derived value")]
    Bloom,
    /// The header's `receiptsRoot` does not match the computed receipts trie root.
    #[error("receipts root {declared} does not match computed {computed}")]
    ReceiptRoot {
        /// The header's declared receipts root.
        declared: B256,
        /// The root computed from this block's receipts.
        computed: B256,
    },
    /// The header's `stateRoot` does not match the root left by persisting every transaction.
    #[error("state root {declared} does not match computed {computed}")]
    StateRoot {
        /// The header's declared state root.
        declared: B256,
        /// The root computed by persisting the accounts cache.
        computed: B256,
    },
    /// The header's `transactionsRoot` does not match the computed transactions trie root.
    #[error("transactions root {declared} does not match computed {computed}")]
    TxRoot {
        /// The header's declared transactions root.
        declared: B256,
        /// The root computed from this block's transaction bodies.
        computed: B256,
    },
    /// The header's `ommersHash` does not match the hash of the supplied ommer headers.
    #[error("ommers hash {declared} does not match computed {computed}")]
    OmmersHash {
        /// The header's declared ommers hash.
        declared: B256,
        /// The hash computed from the supplied ommer headers.
        computed: B256,
    },
    /// The header's gas limit does not satisfy the parent-relative bound.
    #[error(transparent)]
    GasLimit(#[from] execore_chainspec::ChainSpecError),
    /// The header's base fee does not match the value derived from its parent (London+).
    #[error("base fee {declared} does not match derived value {derived}")]
    BaseFee {
        /// The header's declared base fee.
        declared: u64,
        /// The base fee derived from the parent header.
        derived: u64,
    },
    /// The header's declared `gasUsed` does not match the cumulative gas actually consumed.
    #[error("gas used {declared} does not match computed {computed}")]
    GasUsed {
        /// The header's declared gas used.
        declared: u64,
        /// The gas used computed from executing every transaction.
        computed: u64,
    },
}

/// An error that aborts a whole block's execution. Any `BlockError` must leave the underlying
/// store exactly as it was before `persistBlocks` was called: the caller disposes the open
/// [`execore_kv::Txn`] rather than committing it.
#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    /// A transaction within the block was rejected.
    #[error("transaction {index} rejected: {source}")]
    Transaction {
        /// The rejected transaction's index within the block.
        index: usize,
        /// The underlying rejection.
        #[source]
        source: TxError,
    },
    /// The block disagreed with an independently-derived value.
    #[error(transparent)]
    BadBlock(#[from] BadBlockKind),
    /// The parent block referenced by this block's `parentHash` is not present in the store.
    #[error("parent block not found")]
    ParentNotFound,
    /// The underlying accounts cache or trie failed.
    #[error(transparent)]
    State(#[from] execore_state::StateError),
    /// The underlying key/value store failed while opening or closing the block's transaction.
    #[error(transparent)]
    Kv(#[from] execore_kv::KvError),
}
