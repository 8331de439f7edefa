//! The EVM dispatch loop: decodes and executes opcodes against a [`Computation`], suspending the
//! current frame and spawning a child on `CALL`/`CREATE`-family instructions rather than
//! recursing.

use crate::{
    block_context::BlockContext,
    computation::{Computation, Halt},
    errors::{EvmError, EvmResult},
    gas::{self, CallCostInput, SstoreSlot},
    memory::Memory,
    message::{CallKind, Message},
    opcode::OpCode,
    precompiles,
};
use alloy_primitives::{keccak256, Address, Bytes, Log, LogData, B256, U256};
use execore_chainspec::ForkId;
use execore_kv::KvStore;
use execore_state::{AccountsCache, SnapshotId};

/// Per-transaction environment the interpreter consults for opcodes that are not purely
/// block-wide (`ORIGIN`, `GASPRICE`).
#[derive(Debug, Clone, Copy)]
pub struct TxContext {
    /// The original external account that initiated the transaction (`ORIGIN`).
    pub origin: Address,
    /// The effective gas price the transaction pays (`GASPRICE`).
    pub gas_price: u64,
}

/// The maximum depth a call/create chain may reach.
pub const MAX_CALL_DEPTH: u32 = 1024;

/// A fatal failure of the interpreter's host environment — a KV store error surfacing through
/// the accounts cache. Distinct from [`EvmError`], which represents ordinary EVM exceptional
/// halts that terminate only the current frame.
#[derive(thiserror::Error, Debug)]
pub enum InterpreterError {
    /// The underlying state store failed.
    #[error(transparent)]
    State(#[from] execore_state::StateError),
}

/// A [`Result`] alias for the interpreter's driving loop.
pub type InterpreterResult<T> = Result<T, InterpreterError>;

enum StepError {
    Evm(EvmError),
    State(execore_state::StateError),
}

impl From<EvmError> for StepError {
    fn from(e: EvmError) -> Self {
        Self::Evm(e)
    }
}

impl From<execore_state::StateError> for StepError {
    fn from(e: execore_state::StateError) -> Self {
        Self::State(e)
    }
}

type StepResult<T> = Result<T, StepError>;

enum StepOutcome {
    Continue,
    Halt(Halt),
    Suspend { message: Message, code: Bytes, pending: PendingCall },
}

struct PendingCall {
    snapshot: SnapshotId,
    out_offset: usize,
    out_len: usize,
    /// Set for `CREATE`/`CREATE2`: the address success pushes instead of `1`, and the address
    /// code is deployed to on a successful return.
    create_address: Option<Address>,
}

fn u256_to_address(value: U256) -> Address {
    Address::from_slice(&value.to_be_bytes::<32>()[12..])
}

fn address_to_u256(address: Address) -> U256 {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(address.as_slice());
    U256::from_be_bytes(buf)
}

/// Bounds a stack-supplied byte offset/length to something memory could plausibly grow to.
/// Anything larger would cost far more gas than any real block limit allows; treating it as an
/// immediate out-of-gas avoids attempting an enormous allocation.
fn bounded_usize(value: U256) -> EvmResult<usize> {
    if value > U256::from(u32::MAX) {
        return Err(EvmError::OutOfGas);
    }
    Ok(value.to::<u64>() as usize)
}

fn charge_memory_expansion(frame: &mut Computation, offset: usize, len: usize) -> EvmResult<()> {
    if len == 0 {
        return Ok(());
    }
    let old_words = Memory::words_for(frame.memory.len()) as u64;
    let new_words = Memory::words_for(offset.saturating_add(len)) as u64;
    frame.gas.charge(gas::memory_expansion_cost(old_words, new_words))
}

fn is_negative(value: U256) -> bool {
    (value >> 255usize) & U256::from(1_u64) == U256::from(1_u64)
}

fn negate(value: U256) -> U256 {
    (!value).wrapping_add(U256::from(1_u64))
}

fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let min = U256::from(1_u64) << 255usize;
    if a == min && b == negate(U256::from(1_u64)) {
        return min;
    }
    let (neg_a, neg_b) = (is_negative(a), is_negative(b));
    let abs_a = if neg_a { negate(a) } else { a };
    let abs_b = if neg_b { negate(b) } else { b };
    let result = abs_a / abs_b;
    if neg_a != neg_b {
        negate(result)
    } else {
        result
    }
}

fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    let neg_a = is_negative(a);
    let abs_a = if neg_a { negate(a) } else { a };
    let abs_b = if is_negative(b) { negate(b) } else { b };
    let result = abs_a % abs_b;
    if neg_a {
        negate(result)
    } else {
        result
    }
}

fn slt(a: U256, b: U256) -> bool {
    let (na, nb) = (is_negative(a), is_negative(b));
    if na != nb {
        na
    } else {
        a < b
    }
}

fn sar(shift: U256, value: U256) -> U256 {
    if shift >= U256::from(256_u64) {
        return if is_negative(value) { U256::MAX } else { U256::ZERO };
    }
    let shift = shift.to::<u64>() as usize;
    if shift == 0 {
        return value;
    }
    let shifted = value >> shift;
    if is_negative(value) {
        let fill = U256::MAX << (256 - shift);
        shifted | fill
    } else {
        shifted
    }
}

fn u256_from_be(bytes: &[u8]) -> U256 {
    let mut buf = [0u8; 32];
    let len = bytes.len().min(32);
    buf[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    U256::from_be_bytes(buf)
}

/// `ADDMOD`: addition over arbitrary-precision intermediates, since `a + b` can exceed 256 bits
/// before the reduction.
fn addmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::ZERO;
    }
    let sum = precompiles::bytes_add(&a.to_be_bytes::<32>(), &b.to_be_bytes::<32>());
    u256_from_be(&precompiles::bytes_mod(&sum, &m.to_be_bytes::<32>()))
}

/// `MULMOD`: multiplication over arbitrary-precision intermediates, since `a * b` can exceed 256
/// bits before the reduction.
fn mulmod(a: U256, b: U256, m: U256) -> U256 {
    if m.is_zero() {
        return U256::ZERO;
    }
    let product = precompiles::bytes_mul(&a.to_be_bytes::<32>(), &b.to_be_bytes::<32>());
    u256_from_be(&precompiles::bytes_mod(&product, &m.to_be_bytes::<32>()))
}

fn signextend(byte_num: U256, value: U256) -> U256 {
    if byte_num >= U256::from(32_u64) {
        return value;
    }
    let byte_num = byte_num.to::<u64>() as usize;
    let bit_index = byte_num * 8 + 7;
    let sign_bit = U256::from(1_u64) << bit_index;
    let mask = sign_bit - U256::from(1_u64);
    if value & sign_bit != U256::ZERO {
        value | !mask
    } else {
        value & mask
    }
}

/// The outcome of running a transaction's top-level frame to completion: the terminal halt
/// reason, its return data, and the root frame's final accounting (gas remaining, logs emitted,
/// and accumulated refund-counter delta), which the caller folds into the transaction's receipt.
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// How the top-level frame terminated.
    pub halt: Halt,
    /// The top-level frame's final return data.
    pub output: Bytes,
    /// Gas left in the top-level frame when it halted.
    pub gas_remaining: u64,
    /// Logs emitted by the top-level frame and everything it successfully called into.
    pub logs: Vec<Log>,
    /// The net EIP-2200/EIP-3529 refund-counter delta accumulated across the whole call tree.
    pub refund: i64,
}

/// Runs `message` and any nested calls/creates it makes to completion, returning the terminal
/// halt reason and the top-level frame's final accounting.
pub fn execute<S: KvStore>(
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    block: &BlockContext,
    tx: &TxContext,
    message: Message,
) -> InterpreterResult<ExecutionOutcome> {
    let code = load_code(cache, &message)?;
    let mut frames = vec![Computation::new(message, code)];
    let mut pending: Vec<PendingCall> = Vec::new();

    loop {
        let outcome = step(frames.last_mut().expect("at least one frame"), cache, fork, block, tx)?;

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Suspend { message, code, pending: frame_pending } => {
                pending.push(frame_pending);
                frames.push(Computation::new(message, code));
            }
            StepOutcome::Halt(halt) => {
                if frames.len() == 1 {
                    let root = frames.pop().expect("checked len == 1 above");
                    let output = match &halt {
                        Halt::Return { data } | Halt::Revert { data } => data.clone(),
                        Halt::Exception => Bytes::new(),
                    };
                    let (logs, refund) = match halt {
                        Halt::Return { .. } => (root.logs, root.refund),
                        Halt::Revert { .. } | Halt::Exception => (Vec::new(), 0),
                    };
                    return Ok(ExecutionOutcome {
                        halt,
                        output,
                        gas_remaining: root.gas.remaining(),
                        logs,
                        refund,
                    });
                }
                let child = frames.pop().expect("checked len > 1 above");
                let call = pending.pop().expect("one pending entry per suspended frame");
                let parent = frames.last_mut().expect("parent frame remains");
                resolve_child(cache, fork, parent, child, halt, call)?;
            }
        }
    }
}

fn load_code<S: KvStore>(
    cache: &mut AccountsCache<'_, S>,
    message: &Message,
) -> Result<Bytes, execore_state::StateError> {
    if message.kind.is_create() {
        Ok(message.input.clone())
    } else {
        cache.get_code(message.code_address)
    }
}

/// `G_CODEDEPOSIT`: per-byte cost of storing newly deployed contract code.
const CODE_DEPOSIT_COST: u64 = 200;

fn resolve_child<S: KvStore>(
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    parent: &mut Computation,
    mut child: Computation,
    halt: Halt,
    call: PendingCall,
) -> InterpreterResult<()> {
    match halt {
        Halt::Return { data } => {
            if let Some(address) = call.create_address {
                let deployed = validate_deployed_code(&data, fork)
                    .and_then(|()| child.gas.charge(CODE_DEPOSIT_COST * data.len() as u64));
                match deployed {
                    Ok(()) => {
                        cache.set_code(address, data)?;
                        parent.stack.push(address_to_u256(address)).ok();
                        parent.return_data = Bytes::new();
                        parent.absorb_child_effects(&child);
                    }
                    Err(_) => {
                        child.gas.burn_all();
                        cache.revert(call.snapshot)?;
                        parent.stack.push(U256::ZERO).ok();
                        parent.return_data = Bytes::new();
                    }
                }
            } else {
                parent.return_data = data.clone();
                write_return_window(parent, &data, call.out_offset, call.out_len);
                parent.stack.push(U256::from(1_u64)).ok();
                parent.absorb_child_effects(&child);
            }
        }
        Halt::Revert { data } => {
            cache.revert(call.snapshot)?;
            parent.return_data = data.clone();
            write_return_window(parent, &data, call.out_offset, call.out_len);
            parent.stack.push(U256::ZERO).ok();
        }
        Halt::Exception => {
            child.gas.burn_all();
            cache.revert(call.snapshot)?;
            parent.return_data = Bytes::new();
            parent.stack.push(U256::ZERO).ok();
        }
    }

    parent.gas.refund(child.gas.remaining());
    Ok(())
}

fn validate_deployed_code(data: &Bytes, fork: ForkId) -> EvmResult<()> {
    if fork.rejects_invalid_code_prefix() && data.first() == Some(&0xef) {
        return Err(EvmError::InvalidCodePrefix);
    }
    if let Some(max) = fork.max_code_size() {
        if data.len() > max {
            return Err(EvmError::CodeTooLarge { size: data.len(), max });
        }
    }
    Ok(())
}

fn write_return_window(frame: &mut Computation, data: &[u8], offset: usize, len: usize) {
    if len == 0 {
        return;
    }
    frame.memory.resize(offset, len);
    let copy_len = len.min(data.len());
    frame.memory.store(offset, &data[..copy_len]);
}

fn step<S: KvStore>(
    frame: &mut Computation,
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    block: &BlockContext,
    tx: &TxContext,
) -> InterpreterResult<StepOutcome> {
    match step_inner(frame, cache, fork, block, tx) {
        Ok(outcome) => Ok(outcome),
        Err(StepError::Evm(EvmError::RevertExecution { data })) => {
            Ok(StepOutcome::Halt(Halt::Revert { data }))
        }
        Err(StepError::Evm(_)) => {
            frame.gas.burn_all();
            Ok(StepOutcome::Halt(Halt::Exception))
        }
        Err(StepError::State(e)) => Err(InterpreterError::State(e)),
    }
}

fn step_inner<S: KvStore>(
    frame: &mut Computation,
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    block: &BlockContext,
    tx: &TxContext,
) -> StepResult<StepOutcome> {
    use OpCode::*;

    let Some(byte) = frame.current_byte() else {
        return Ok(StepOutcome::Halt(Halt::Return { data: Bytes::new() }));
    };
    let op = match OpCode::from_byte(byte) {
        Some(op) if op != Invalid && op.is_available(fork) => op,
        _ => return Err(EvmError::InvalidOpcode { opcode: byte, pc: frame.pc }.into()),
    };

    if frame.message.is_static && op.is_state_mutating() {
        return Err(EvmError::StaticContextViolation.into());
    }

    frame.gas.charge(gas::static_cost(op, fork))?;

    let mut advance_pc = true;

    match op {
        Stop => return Ok(StepOutcome::Halt(Halt::Return { data: Bytes::new() })),

        Add => binop(frame, |a, b| a.wrapping_add(b))?,
        Mul => binop(frame, |a, b| a.wrapping_mul(b))?,
        Sub => binop(frame, |a, b| a.wrapping_sub(b))?,
        Div => binop(frame, |a, b| if b.is_zero() { U256::ZERO } else { a / b })?,
        SDiv => binop(frame, sdiv)?,
        Mod => binop(frame, |a, b| if b.is_zero() { U256::ZERO } else { a % b })?,
        SMod => binop(frame, smod)?,
        Lt => binop_bool(frame, |a, b| a < b)?,
        Gt => binop_bool(frame, |a, b| a > b)?,
        Slt => binop_bool(frame, slt)?,
        Sgt => binop_bool(frame, |a, b| slt(b, a))?,
        Eq => binop_bool(frame, |a, b| a == b)?,
        IsZero => {
            let a = frame.stack.pop()?;
            frame.stack.push(if a.is_zero() { U256::from(1_u64) } else { U256::ZERO })?;
        }
        And => binop(frame, |a, b| a & b)?,
        Or => binop(frame, |a, b| a | b)?,
        Xor => binop(frame, |a, b| a ^ b)?,
        Not => {
            let a = frame.stack.pop()?;
            frame.stack.push(!a)?;
        }
        Byte => binop(frame, |i, value| {
            if i >= U256::from(32_u64) {
                U256::ZERO
            } else {
                let i = i.to::<u64>() as usize;
                U256::from(value.to_be_bytes::<32>()[i])
            }
        })?,
        Shl => binop(frame, |shift, value| {
            if shift >= U256::from(256_u64) {
                U256::ZERO
            } else {
                value << shift.to::<u64>() as usize
            }
        })?,
        Shr => binop(frame, |shift, value| {
            if shift >= U256::from(256_u64) {
                U256::ZERO
            } else {
                value >> shift.to::<u64>() as usize
            }
        })?,
        Sar => binop(frame, sar)?,
        AddMod => {
            let (a, b, m) = (frame.stack.pop()?, frame.stack.pop()?, frame.stack.pop()?);
            frame.stack.push(addmod(a, b, m))?;
        }
        MulMod => {
            let (a, b, m) = (frame.stack.pop()?, frame.stack.pop()?, frame.stack.pop()?);
            frame.stack.push(mulmod(a, b, m))?;
        }
        Exp => {
            let (base, exponent) = (frame.stack.pop()?, frame.stack.pop()?);
            let exponent_bytes = exponent.to_be_bytes::<32>();
            let byte_len = 32 - exponent_bytes.iter().take_while(|&&b| b == 0).count();
            frame.gas.charge(gas::exp_byte_cost(fork) * byte_len as u64)?;
            frame.stack.push(base.wrapping_pow(exponent))?;
        }
        SignExtend => binop(frame, signextend)?,

        Sha3 => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, offset, len)?;
            frame.gas.charge(6 * gas::words_ceil(len))?;
            let data = frame.memory.load_range(offset, len);
            frame.stack.push(U256::from_be_bytes(*keccak256(&data)))?;
        }

        Address => frame.stack.push(address_to_u256(frame.message.recipient))?,
        Balance => {
            let address = u256_to_address(frame.stack.pop()?);
            let is_cold = cache.warm_address(address);
            frame.gas.charge(gas::address_access_cost(fork, is_cold, 0))?;
            frame.stack.push(cache.get_account(address)?.balance)?;
        }
        Origin => frame.stack.push(address_to_u256(tx.origin))?,
        Caller => frame.stack.push(address_to_u256(frame.message.sender))?,
        CallValue => frame.stack.push(frame.message.value)?,
        CallDataLoad => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let mut buf = [0u8; 32];
            for (i, b) in buf.iter_mut().enumerate() {
                *b = frame.message.input.get(offset + i).copied().unwrap_or(0);
            }
            frame.stack.push(U256::from_be_bytes(buf))?;
        }
        CallDataSize => frame.stack.push(U256::from(frame.message.input.len() as u64))?,
        CallDataCopy => {
            let dest = bounded_usize(frame.stack.pop()?)?;
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, dest, len)?;
            frame.gas.charge(3 * gas::words_ceil(len))?;
            copy_padded(frame, dest, &frame.message.input.clone(), offset, len);
        }
        CodeSize => frame.stack.push(U256::from(frame.code.len() as u64))?,
        CodeCopy => {
            let dest = bounded_usize(frame.stack.pop()?)?;
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, dest, len)?;
            frame.gas.charge(3 * gas::words_ceil(len))?;
            copy_padded(frame, dest, &frame.code.clone(), offset, len);
        }
        GasPrice => frame.stack.push(U256::from(tx.gas_price))?,
        ExtCodeSize => {
            let address = u256_to_address(frame.stack.pop()?);
            let is_cold = cache.warm_address(address);
            frame.gas.charge(gas::address_access_cost(fork, is_cold, 0))?;
            frame.stack.push(U256::from(cache.get_code(address)?.len() as u64))?;
        }
        ExtCodeCopy => {
            let address = u256_to_address(frame.stack.pop()?);
            let dest = bounded_usize(frame.stack.pop()?)?;
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            let is_cold = cache.warm_address(address);
            frame.gas.charge(gas::address_access_cost(fork, is_cold, 0))?;
            charge_memory_expansion(frame, dest, len)?;
            frame.gas.charge(3 * gas::words_ceil(len))?;
            let code = cache.get_code(address)?;
            copy_padded(frame, dest, &code, offset, len);
        }
        ReturnDataSize => frame.stack.push(U256::from(frame.return_data.len() as u64))?,
        ReturnDataCopy => {
            let dest = bounded_usize(frame.stack.pop()?)?;
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, dest, len)?;
            frame.gas.charge(3 * gas::words_ceil(len))?;
            copy_padded(frame, dest, &frame.return_data.clone(), offset, len);
        }
        ExtCodeHash => {
            let address = u256_to_address(frame.stack.pop()?);
            let is_cold = cache.warm_address(address);
            frame.gas.charge(gas::address_access_cost(fork, is_cold, 0))?;
            let account = cache.get_account(address)?;
            let hash = if account.is_empty() {
                B256::ZERO
            } else {
                cache.get_code_hash(address)?
            };
            frame.stack.push(U256::from_be_bytes(*hash))?;
        }
        BlockHash => {
            let number = frame.stack.pop()?;
            let number = number.to::<u64>();
            frame.stack.push(U256::from_be_bytes(*block.block_hash(number)))?;
        }
        Coinbase => frame.stack.push(address_to_u256(block.coinbase))?,
        Timestamp => frame.stack.push(U256::from(block.timestamp))?,
        Number => frame.stack.push(U256::from(block.number))?,
        Difficulty => frame.stack.push(block.difficulty)?,
        GasLimit => frame.stack.push(U256::from(block.gas_limit))?,
        ChainId => frame.stack.push(U256::from(block.chain_id))?,
        SelfBalance => {
            frame.stack.push(cache.get_account(frame.message.recipient)?.balance)?;
        }
        BaseFee => frame.stack.push(U256::from(block.base_fee.unwrap_or(0)))?,

        Pop => {
            frame.stack.pop()?;
        }
        MLoad => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, offset, 32)?;
            frame.stack.push(frame.memory.load_word(offset))?;
        }
        MStore => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let value = frame.stack.pop()?;
            charge_memory_expansion(frame, offset, 32)?;
            frame.memory.store(offset, &value.to_be_bytes::<32>());
        }
        MStore8 => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let value = frame.stack.pop()?;
            charge_memory_expansion(frame, offset, 1)?;
            frame.memory.store_byte(offset, value.to_be_bytes::<32>()[31]);
        }
        SLoad => {
            let key = frame.stack.pop()?;
            let is_cold = cache.warm_slot(frame.message.recipient, key);
            frame.gas.charge(gas::sload_cost(fork, is_cold))?;
            frame.stack.push(cache.get_storage(frame.message.recipient, key)?)?;
        }
        SStore => {
            const SSTORE_SENTRY: u64 = 2300;
            if frame.gas.remaining() <= SSTORE_SENTRY {
                return Err(EvmError::OutOfGas.into());
            }
            let key = frame.stack.pop()?;
            let new = frame.stack.pop()?;
            let address = frame.message.recipient;
            let is_cold = cache.warm_slot(address, key);
            if is_cold {
                frame.gas.charge(gas::COLD_SLOAD_COST)?;
            }
            let original = cache.get_storage(address, key)?;
            let current = original;
            let outcome = gas::sstore_outcome(fork, SstoreSlot { original, current, new });
            frame.gas.charge(outcome.cost)?;
            frame.refund += outcome.refund_delta;
            cache.set_storage(address, key, new)?;
        }
        Jump => {
            let destination = bounded_usize(frame.stack.pop()?)?;
            jump(frame, destination)?;
            advance_pc = false;
        }
        JumpI => {
            let destination = bounded_usize(frame.stack.pop()?)?;
            let condition = frame.stack.pop()?;
            if !condition.is_zero() {
                jump(frame, destination)?;
                advance_pc = false;
            }
        }
        Pc => frame.stack.push(U256::from(frame.pc as u64))?,
        MSize => frame.stack.push(U256::from(frame.memory.len() as u64))?,
        Gas => frame.stack.push(U256::from(frame.gas.remaining()))?,
        JumpDest => {}

        Push(n) => {
            let mut buf = [0u8; 32];
            for i in 0..n as usize {
                buf[32 - n as usize + i] = frame.code.get(frame.pc + 1 + i).copied().unwrap_or(0);
            }
            frame.stack.push(U256::from_be_bytes(buf))?;
            frame.pc += 1 + n as usize;
            advance_pc = false;
        }
        Dup(depth) => frame.stack.dup(depth)?,
        Swap(depth) => frame.stack.swap(depth)?,

        Log(topic_count) => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            let mut topics = Vec::with_capacity(topic_count as usize);
            for _ in 0..topic_count {
                topics.push(B256::from(frame.stack.pop()?.to_be_bytes::<32>()));
            }
            charge_memory_expansion(frame, offset, len)?;
            frame.gas.charge(gas::words_ceil(len) * 8)?;
            let data = frame.memory.load_range(offset, len);
            frame.logs.push(Log {
                address: frame.message.recipient,
                data: LogData::new_unchecked(topics, data.into()),
            });
        }

        Create | Create2 => {
            return create(frame, cache, fork, op);
        }
        Call | CallCode | DelegateCall | StaticCall => {
            return call(frame, cache, fork, op);
        }

        Return => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, offset, len)?;
            let data = frame.memory.load_range(offset, len);
            return Ok(StepOutcome::Halt(Halt::Return { data: data.into() }));
        }
        Revert => {
            let offset = bounded_usize(frame.stack.pop()?)?;
            let len = bounded_usize(frame.stack.pop()?)?;
            charge_memory_expansion(frame, offset, len)?;
            let data = frame.memory.load_range(offset, len);
            return Err(EvmError::RevertExecution { data: data.into() }.into());
        }
        Invalid => return Err(EvmError::InvalidOpcode { opcode: byte, pc: frame.pc }.into()),
        SelfDestruct => {
            let beneficiary = u256_to_address(frame.stack.pop()?);
            let is_cold = cache.warm_address(beneficiary);
            if is_cold && fork as u8 >= ForkId::Berlin as u8 {
                frame.gas.charge(gas::COLD_ACCOUNT_ACCESS_COST)?;
            }
            cache.self_destruct(frame.message.recipient, beneficiary)?;
            frame.selfdestructs.push((frame.message.recipient, beneficiary));
            return Ok(StepOutcome::Halt(Halt::Return { data: Bytes::new() }));
        }
    }

    if advance_pc {
        frame.pc += 1;
    }
    Ok(StepOutcome::Continue)
}

fn binop(frame: &mut Computation, f: impl FnOnce(U256, U256) -> U256) -> EvmResult<()> {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(f(a, b))
}

fn binop_bool(frame: &mut Computation, f: impl FnOnce(U256, U256) -> bool) -> EvmResult<()> {
    let a = frame.stack.pop()?;
    let b = frame.stack.pop()?;
    frame.stack.push(if f(a, b) { U256::from(1_u64) } else { U256::ZERO })
}

fn copy_padded(frame: &mut Computation, dest: usize, source: &[u8], offset: usize, len: usize) {
    if len == 0 {
        return;
    }
    let mut buf = vec![0u8; len];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = source.get(offset + i).copied().unwrap_or(0);
    }
    frame.memory.store(dest, &buf);
}

fn jump(frame: &mut Computation, destination: usize) -> EvmResult<()> {
    if !frame.jumpdests.contains(&destination) {
        return Err(EvmError::InvalidJumpDest { destination });
    }
    frame.pc = destination;
    Ok(())
}

fn call<S: KvStore>(
    frame: &mut Computation,
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    op: OpCode,
) -> StepResult<StepOutcome> {
    let kind = match op {
        OpCode::Call => CallKind::Call,
        OpCode::CallCode => CallKind::CallCode,
        OpCode::DelegateCall => CallKind::DelegateCall,
        OpCode::StaticCall => CallKind::StaticCall,
        _ => unreachable!("caller filters to call-family opcodes"),
    };

    let requested_gas = frame.stack.pop()?;
    let code_address = u256_to_address(frame.stack.pop()?);
    let value = if matches!(kind, CallKind::Call | CallKind::CallCode) {
        frame.stack.pop()?
    } else {
        U256::ZERO
    };
    let in_offset = bounded_usize(frame.stack.pop()?)?;
    let in_len = bounded_usize(frame.stack.pop()?)?;
    let out_offset = bounded_usize(frame.stack.pop()?)?;
    let out_len = bounded_usize(frame.stack.pop()?)?;

    if matches!(kind, CallKind::Call) && frame.message.is_static && !value.is_zero() {
        return Err(EvmError::StaticContextViolation.into());
    }

    charge_memory_expansion(frame, in_offset, in_len)?;
    charge_memory_expansion(frame, out_offset, out_len)?;

    let is_cold = cache.warm_address(code_address);
    let target = cache.get_account(code_address)?;
    let creates_account = matches!(kind, CallKind::Call) && !value.is_zero() && target.is_empty();

    let outcome = gas::call_cost(CallCostInput {
        base_access_cost: gas::address_access_cost(fork, is_cold, 0),
        transfers_value: !value.is_zero(),
        creates_account,
        gas_available: frame.gas.remaining(),
        requested_gas: requested_gas.to::<u64>().min(u64::MAX),
    })?;
    frame.gas.charge(outcome.cost)?;

    if frame.message.depth + 1 > MAX_CALL_DEPTH {
        frame.stack.push(U256::ZERO)?;
        return Ok(StepOutcome::Continue);
    }
    if matches!(kind, CallKind::Call | CallKind::CallCode) && !value.is_zero() {
        let sender_balance = cache.get_account(frame.message.recipient)?.balance;
        if sender_balance < value {
            frame.stack.push(U256::ZERO)?;
            return Ok(StepOutcome::Continue);
        }
    }

    let stipend = if !value.is_zero() { gas::CALL_STIPEND } else { 0 };
    frame.gas.charge(outcome.child_gas_limit - stipend)?;

    let input = frame.memory.load_range(in_offset, in_len);
    let child_value_field = if matches!(kind, CallKind::DelegateCall) { frame.message.value } else { value };
    let recipient = if matches!(kind, CallKind::CallCode | CallKind::DelegateCall) {
        frame.message.recipient
    } else {
        code_address
    };

    let snapshot = cache.snapshot();
    if matches!(kind, CallKind::Call | CallKind::CallCode) && !value.is_zero() {
        cache.sub_balance(frame.message.recipient, value)?;
        cache.add_balance(recipient, value)?;
    }

    if let Some(result) =
        precompiles::run(code_address, &input, outcome.child_gas_limit, fork)
    {
        match result {
            Ok((used, output)) => {
                cache.commit(snapshot)?;
                frame.gas.refund(outcome.child_gas_limit.saturating_sub(used));
                frame.return_data = output.clone();
                write_return_window(frame, &output, out_offset, out_len);
                frame.stack.push(U256::from(1_u64))?;
            }
            Err(_) => {
                cache.revert(snapshot)?;
                frame.return_data = Bytes::new();
                frame.stack.push(U256::ZERO)?;
            }
        }
        return Ok(StepOutcome::Continue);
    }

    let child_message = frame.message.child(
        kind,
        recipient,
        code_address,
        child_value_field,
        input.into(),
        outcome.child_gas_limit,
    );
    let code = cache.get_code(code_address)?;

    Ok(StepOutcome::Suspend {
        message: child_message,
        code,
        pending: PendingCall { snapshot, out_offset, out_len, create_address: None },
    })
}

fn create<S: KvStore>(
    frame: &mut Computation,
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    op: OpCode,
) -> StepResult<StepOutcome> {
    let value = frame.stack.pop()?;
    let offset = bounded_usize(frame.stack.pop()?)?;
    let len = bounded_usize(frame.stack.pop()?)?;
    let salt = if matches!(op, OpCode::Create2) { Some(frame.stack.pop()?) } else { None };

    charge_memory_expansion(frame, offset, len)?;
    if let Some(_salt) = salt {
        frame.gas.charge(gas::words_ceil(len) * 6)?;
    }

    if frame.message.depth + 1 > MAX_CALL_DEPTH {
        frame.stack.push(U256::ZERO)?;
        return Ok(StepOutcome::Continue);
    }

    let sender = frame.message.recipient;
    let sender_account = cache.get_account(sender)?;
    if sender_account.balance < value {
        frame.stack.push(U256::ZERO)?;
        return Ok(StepOutcome::Continue);
    }

    let init_code = frame.memory.load_range(offset, len);
    let new_address = match salt {
        Some(salt) => {
            let init_code_hash = keccak256(&init_code);
            sender.create2(B256::from(salt.to_be_bytes::<32>()), init_code_hash)
        }
        None => sender.create(sender_account.nonce),
    };

    let existing = cache.get_account(new_address)?;
    if existing.nonce != 0 || existing.code_hash != execore_trie::EMPTY_CODE_HASH {
        frame.stack.push(U256::ZERO)?;
        return Ok(StepOutcome::Continue);
    }

    cache.sub_balance(sender, value)?;
    let new_nonce = sender_account.nonce + 1;
    cache.set_nonce(sender, new_nonce)?;

    let snapshot = cache.snapshot();
    cache.set_nonce(new_address, 1)?;
    cache.add_balance(new_address, value)?;

    let gas_after_reserve = frame.gas.remaining();
    let child_gas_limit = gas_after_reserve - gas_after_reserve / gas::CALL_GAS_RETENTION_DENOMINATOR;
    frame.gas.charge(child_gas_limit)?;

    let child_message = frame.message.child(
        if matches!(op, OpCode::Create2) { CallKind::Create2 } else { CallKind::Create },
        new_address,
        new_address,
        value,
        init_code.clone().into(),
        child_gas_limit,
    );

    let _ = fork;
    Ok(StepOutcome::Suspend {
        message: child_message,
        code: init_code.into(),
        pending: PendingCall { snapshot, out_offset: 0, out_len: 0, create_address: Some(new_address) },
    })
}
