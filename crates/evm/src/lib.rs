//! A fork-parameterized EVM interpreter: stack machine, gas accounting, memory, and non-recursive
//! `CALL`/`CREATE`-family frame chaining.

#![warn(missing_debug_implementations, unreachable_pub)]

mod stack;
pub use stack::{Stack, STACK_LIMIT};

mod memory;
pub use memory::Memory;

mod errors;
pub use errors::{EvmError, EvmResult};

mod gas;
pub use gas::{
    call_cost, exp_byte_cost, memory_expansion_cost, sload_cost, sstore_outcome, static_cost,
    words_ceil, CallCostInput, CallCostOutcome, GasMeter, SstoreOutcome, SstoreSlot,
    COLD_ACCOUNT_ACCESS_COST, COLD_SLOAD_COST, WARM_STORAGE_READ_COST,
};

mod opcode;
pub use opcode::OpCode;

mod message;
pub use message::{CallKind, Message};

mod block_context;
pub use block_context::BlockContext;

mod computation;
pub use computation::{Computation, Halt};

mod precompiles;
pub use precompiles::{run as run_precompile, PrecompileError, PrecompileResult};

mod interpreter;
pub use interpreter::{
    execute, ExecutionOutcome, InterpreterError, InterpreterResult, TxContext, MAX_CALL_DEPTH,
};
