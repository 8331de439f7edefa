//! [`Computation`] — per-call-frame mutable state.

use crate::{gas::GasMeter, memory::Memory, message::Message, opcode::OpCode, stack::Stack};
use alloy_primitives::{map::HashSet, Address, Bytes, Log};

/// The outcome of a frame running to completion, before its continuation merges it into its
/// parent (or, for the root frame, into the transaction receipt).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// `STOP`, `RETURN`, or falling off the end of the code; `data` is the return value.
    Return { data: Bytes },
    /// `REVERT`; state changes in this subtree unwind, but unused gas is returned.
    Revert { data: Bytes },
    /// An exceptional halt (`OutOfGas`, `InvalidOpcode`, ...); all remaining gas is burned and
    /// state changes in this subtree unwind.
    Exception,
}

/// Per-call-frame mutable state: the stack, memory, gas meter, program counter, code, message,
/// and the logs/touched-account bookkeeping that is either propagated to the parent on success
/// or dropped on failure.
#[derive(Debug)]
pub struct Computation {
    /// The frame's input.
    pub message: Message,
    /// The code this frame executes.
    pub code: Bytes,
    /// The operand stack.
    pub stack: Stack,
    /// The byte-addressable scratch memory.
    pub memory: Memory,
    /// The gas meter.
    pub gas: GasMeter,
    /// The program counter, an index into `code`.
    pub pc: usize,
    /// The most recent child call/create's output, exposed via `RETURNDATASIZE`/`RETURNDATACOPY`.
    pub return_data: Bytes,
    /// Logs emitted by `LOG0..4`, accrued here and merged into the parent on success.
    pub logs: Vec<Log>,
    /// Accounts queued for self-destruct by this frame or a successful descendant, mapped to
    /// their beneficiary.
    pub selfdestructs: Vec<(Address, Address)>,
    /// The frame's own refund-counter contribution, merged into the parent on success.
    pub refund: i64,
    /// Offsets of `JUMPDEST` opcodes that are not embedded in a `PUSH`'s immediate data —
    /// the only offsets `JUMP`/`JUMPI` may legally target. Computed once per frame.
    pub jumpdests: HashSet<usize>,
}

impl Computation {
    /// Creates a fresh frame for `message` executing `code`.
    pub fn new(message: Message, code: Bytes) -> Self {
        let gas = GasMeter::new(message.gas_limit);
        let jumpdests = valid_jumpdests(&code);
        Self {
            message,
            code,
            stack: Stack::new(),
            memory: Memory::new(),
            gas,
            pc: 0,
            return_data: Bytes::new(),
            logs: Vec::new(),
            selfdestructs: Vec::new(),
            refund: 0,
            jumpdests,
        }
    }

    /// The opcode byte at the program counter, or `None` past the end of code (treated as an
    /// implicit `STOP`).
    pub fn current_byte(&self) -> Option<u8> {
        self.code.get(self.pc).copied()
    }

    /// Merges a successfully-completed child frame's logs, selfdestructs, and refund into `self`.
    /// Touched-account propagation and state-cache merging are handled by the interpreter, which
    /// owns the shared `AccountsCache`.
    pub fn absorb_child_effects(&mut self, child: &Computation) {
        self.logs.extend(child.logs.iter().cloned());
        self.selfdestructs.extend(child.selfdestructs.iter().copied());
        self.refund += child.refund;
    }
}

/// Scans `code` for `JUMPDEST` opcodes, skipping over `PUSH` immediate data so a byte that
/// merely happens to equal `0x5b` inside a push's payload is never treated as a valid target.
fn valid_jumpdests(code: &[u8]) -> HashSet<usize> {
    let mut dests = HashSet::default();
    let mut pc = 0;
    while pc < code.len() {
        match OpCode::from_byte(code[pc]) {
            Some(OpCode::JumpDest) => {
                dests.insert(pc);
                pc += 1;
            }
            Some(OpCode::Push(n)) => pc += 1 + n as usize,
            _ => pc += 1,
        }
    }
    dests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CallKind;
    use alloy_primitives::{address, U256};

    fn sample_message() -> Message {
        Message::top_level(
            CallKind::Call,
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
            U256::ZERO,
            Bytes::new(),
            1000,
        )
    }

    #[test]
    fn new_frame_starts_at_pc_zero_with_full_gas() {
        let computation = Computation::new(sample_message(), Bytes::from_static(&[0x00]));
        assert_eq!(computation.pc, 0);
        assert_eq!(computation.gas.remaining(), 1000);
        assert_eq!(computation.current_byte(), Some(0x00));
    }

    #[test]
    fn absorb_child_effects_merges_refund_and_logs() {
        let mut parent = Computation::new(sample_message(), Bytes::new());
        let mut child = Computation::new(sample_message(), Bytes::new());
        child.refund = 100;
        child.selfdestructs.push((
            address!("0000000000000000000000000000000000000003"),
            address!("0000000000000000000000000000000000000004"),
        ));
        parent.absorb_child_effects(&child);
        assert_eq!(parent.refund, 100);
        assert_eq!(parent.selfdestructs.len(), 1);
    }
}
