//! Transaction processing and block execution: composes `execore-evm`'s interpreter with
//! `execore-state`'s accounts cache and `execore-chainspec`'s fork rules into a per-transaction
//! processor and `persistBlocks`.

#![warn(missing_debug_implementations, unreachable_pub)]

mod errors;
pub use errors::{BadBlockKind, BlockError, BlockResult, TxError, TxResult};

mod intrinsic_gas;
pub use intrinsic_gas::intrinsic_gas;

mod tx_processor;
pub use tx_processor::{process_transaction, TxOutcome};

mod block_executor;
pub use block_executor::{persist_blocks, BlockBody};
