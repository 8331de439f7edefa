//! Errors for `execore-evm`.

use alloy_primitives::Address;

/// A [`Result`] type alias where the error is [`EvmError`].
pub type EvmResult<T> = Result<T, EvmError>;

/// An error produced while executing a single call frame.
///
/// Most of these correspond to the EVM's own exceptional-halt conditions: when one occurs mid-
/// frame, the interpreter consumes all remaining gas in that frame and reverts its state changes,
/// rather than propagating a host-level failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// The frame's gas budget was exhausted.
    #[error("out of gas")]
    OutOfGas,
    /// An operation popped more words than the stack held.
    #[error("stack underflow")]
    StackUnderflow,
    /// A push would have exceeded [`crate::STACK_LIMIT`].
    #[error("stack overflow")]
    StackOverflow,
    /// The opcode byte at the program counter has no assigned meaning, or the explicit `INVALID`
    /// opcode was reached.
    #[error("invalid opcode {opcode:#04x} at pc {pc}")]
    InvalidOpcode {
        /// The offending byte.
        opcode: u8,
        /// The program counter at which it was read.
        pc: usize,
    },
    /// `JUMP`/`JUMPI` targeted an offset that is not a `JUMPDEST` reached outside push data.
    #[error("invalid jump destination {destination}")]
    InvalidJumpDest {
        /// The rejected destination.
        destination: usize,
    },
    /// A state-mutating opcode, or a value-bearing `CALL`, was attempted inside a `STATICCALL`.
    #[error("state-mutating opcode attempted in a static context")]
    StaticContextViolation,
    /// A `CALL`-family or `CREATE`-family opcode would have exceeded the maximum call depth.
    #[error("call depth exceeded")]
    CallDepthExceeded,
    /// `CREATE`/`CREATE2` targeted an address that already holds code or a nonzero nonce.
    #[error("contract creation collided with existing account {address}")]
    CreateCollision {
        /// The colliding address.
        address: Address,
    },
    /// Deployed init code exceeded the maximum contract code size.
    #[error("deployed code size {size} exceeds maximum of {max}")]
    CodeTooLarge {
        /// The rejected size, in bytes.
        size: usize,
        /// The maximum permitted size, in bytes.
        max: usize,
    },
    /// Deployed init code begins with the reserved `0xEF` prefix (EIP-3541).
    #[error("deployed code begins with the reserved 0xef prefix")]
    InvalidCodePrefix,
    /// Execution hit `REVERT`; the accompanying bytes are the revert's return data, not an error
    /// in the Rust sense — the interpreter unwinds state changes but does not consume all gas.
    #[error("execution reverted")]
    RevertExecution {
        /// The revert's return data.
        data: alloy_primitives::Bytes,
    },
}
