//! Per-fork gas accounting: the static cost table, dynamic cost handlers, and the [`GasMeter`]
//! that charges against a frame's remaining budget.

use crate::{EvmError, EvmResult, OpCode};
use execore_chainspec::ForkId;

/// `G_COLD_ACCOUNT_ACCESS` (EIP-2929).
pub const COLD_ACCOUNT_ACCESS_COST: u64 = 2600;
/// `G_WARM_STORAGE_READ` (EIP-2929), also the per-access cost once warmed.
pub const WARM_STORAGE_READ_COST: u64 = 100;
/// `G_COLD_SLOAD` (EIP-2929).
pub const COLD_SLOAD_COST: u64 = 2100;
/// Pre-Berlin flat `SLOAD` cost (post-Tangerine).
pub const SLOAD_COST_TANGERINE: u64 = 200;
/// `G_SSET`: writing a zero slot to a nonzero value.
pub const SSTORE_SET_COST: u64 = 20000;
/// `G_SRESET`: writing a nonzero slot to a different value.
pub const SSTORE_RESET_COST: u64 = 5000;
/// Refund for clearing a nonzero slot to zero, pre-London.
pub const SSTORE_CLEAR_REFUND_PRE_LONDON: u64 = 15000;
/// Refund for clearing a nonzero slot to zero, from London (EIP-3529 reduced refunds).
pub const SSTORE_CLEAR_REFUND_LONDON: u64 = 4800;
/// `G_CALLVALUE`: additional cost of a value-bearing call.
pub const CALL_VALUE_COST: u64 = 9000;
/// Stipend granted to the callee when the caller attaches nonzero value.
pub const CALL_STIPEND: u64 = 2300;
/// `G_NEWACCOUNT`: additional cost of a call that creates a new account.
pub const NEW_ACCOUNT_COST: u64 = 25000;
/// EIP-150's cap on gas forwarded to a child call: at most 63/64 of the available gas.
pub const CALL_GAS_RETENTION_DENOMINATOR: u64 = 64;

/// The static (pre-dispatch) gas cost of `op` under `fork`. Dynamic surcharges (memory
/// expansion, access-list state, value transfer, EXP's exponent length, ...) are computed
/// separately once operand values are known.
pub const fn static_cost(op: OpCode, fork: ForkId) -> u64 {
    use OpCode::*;
    match op {
        Stop | Return | Revert | Invalid => 0,
        Add | Sub | Lt | Gt | Slt | Sgt | Eq | IsZero | And | Or | Xor | Not | Byte | Shl
        | Shr | Sar | CallDataLoad | Push(_) | Dup(_) | Swap(_) | Pop | Pc | MSize | Gas
        | CallValue | CallDataSize | CodeSize | GasPrice | Coinbase | Timestamp | Number
        | Difficulty | GasLimit | ChainId | SelfBalance | BaseFee | Address | Origin | Caller
        | ReturnDataSize => 2,
        Mul | Div | SDiv | Mod | SMod | SignExtend => 5,
        AddMod | MulMod | Jump => 8,
        JumpI => 10,
        JumpDest => 1,
        MLoad | MStore | MStore8 => 3,
        Exp => 10,
        Sha3 => 30,
        Log(n) => 375 + 375 * n as u64,
        Create | Create2 => 32000,
        SelfDestruct => {
            if fork as u8 >= ForkId::Tangerine as u8 {
                5000
            } else {
                0
            }
        }
        Balance => {
            if fork as u8 >= ForkId::Berlin as u8 {
                0
            } else if fork as u8 >= ForkId::Tangerine as u8 {
                400
            } else {
                20
            }
        }
        ExtCodeSize | ExtCodeCopy | ExtCodeHash | Call | CallCode | DelegateCall | StaticCall => {
            if fork as u8 >= ForkId::Berlin as u8 {
                0
            } else if fork as u8 >= ForkId::Tangerine as u8 {
                700
            } else {
                20
            }
        }
        SLoad => {
            if fork as u8 >= ForkId::Berlin as u8 {
                0
            } else if fork as u8 >= ForkId::Tangerine as u8 {
                SLOAD_COST_TANGERINE
            } else {
                50
            }
        }
        SStore => 0,
        CallDataCopy | CodeCopy | ReturnDataCopy => 3,
        BlockHash => 20,
    }
}

/// Byte-cost of `EXP`'s dynamic exponent surcharge: `10` per exponent byte pre-Spurious-Dragon,
/// `50` from Spurious Dragon onward (EIP-160).
pub const fn exp_byte_cost(fork: ForkId) -> u64 {
    if fork as u8 >= ForkId::SpuriousDragon as u8 {
        50
    } else {
        10
    }
}

/// The number of 32-byte words `len` bytes occupy, rounding up.
pub const fn words_ceil(len: usize) -> u64 {
    ((len + 31) / 32) as u64
}

/// The cost of growing memory from `old_words` to `new_words` (no-op if it did not grow).
/// `cost(w) = 3w + w²/512`; the charge is the marginal increase.
pub fn memory_expansion_cost(old_words: u64, new_words: u64) -> u64 {
    if new_words <= old_words {
        return 0;
    }
    let cost = |w: u64| 3 * w + (w * w) / 512;
    cost(new_words) - cost(old_words)
}

/// The access-list surcharge for reading a storage slot (EIP-2929, Berlin+): [`COLD_SLOAD_COST`]
/// the first time a transaction touches `(address, slot)`, [`WARM_STORAGE_READ_COST`] after.
/// Pre-Berlin, folds back to the flat [`static_cost`] for `SLOAD`.
pub const fn sload_cost(fork: ForkId, is_cold: bool) -> u64 {
    if fork as u8 >= ForkId::Berlin as u8 {
        if is_cold {
            COLD_SLOAD_COST
        } else {
            WARM_STORAGE_READ_COST
        }
    } else if fork as u8 >= ForkId::Tangerine as u8 {
        SLOAD_COST_TANGERINE
    } else {
        50
    }
}

/// The access-list surcharge for touching an address via `BALANCE`/`EXTCODE*`/`CALL`-family
/// (EIP-2929, Berlin+). Pre-Berlin, returns the flat per-fork cost for `kind`.
pub const fn address_access_cost(fork: ForkId, is_cold: bool, flat_pre_berlin: u64) -> u64 {
    if fork as u8 >= ForkId::Berlin as u8 {
        if is_cold {
            COLD_ACCOUNT_ACCESS_COST
        } else {
            WARM_STORAGE_READ_COST
        }
    } else {
        flat_pre_berlin
    }
}

/// The storage slot's state relevant to the `SSTORE` schedule.
#[derive(Debug, Clone, Copy)]
pub struct SstoreSlot {
    /// The slot's value at the start of the current transaction.
    pub original: alloy_primitives::U256,
    /// The slot's value immediately before this `SSTORE`.
    pub current: alloy_primitives::U256,
    /// The value this `SSTORE` writes.
    pub new: alloy_primitives::U256,
}

/// The outcome of an `SSTORE`: its gas cost and any refund delta (may be negative, since
/// EIP-2200 lets a transaction's net refund decrease as well as increase within one frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SstoreOutcome {
    /// The gas charged for this write, before any access-list surcharge.
    pub cost: u64,
    /// The refund-counter delta (positive credits, negative debits a prior credit).
    pub refund_delta: i64,
}

/// Computes the EIP-2200 (and, from London, EIP-3529-adjusted) `SSTORE` cost and refund delta
/// for `slot`. Callers add the EIP-2929 cold-slot surcharge ([`COLD_SLOAD_COST`]) separately.
pub fn sstore_outcome(fork: ForkId, slot: SstoreSlot) -> SstoreOutcome {
    let clear_refund = if fork as u8 >= ForkId::London as u8 {
        SSTORE_CLEAR_REFUND_LONDON
    } else {
        SSTORE_CLEAR_REFUND_PRE_LONDON
    } as i64;

    if slot.current == slot.new {
        return SstoreOutcome { cost: WARM_STORAGE_READ_COST, refund_delta: 0 };
    }

    if slot.original == slot.current {
        if slot.original.is_zero() {
            return SstoreOutcome { cost: SSTORE_SET_COST, refund_delta: 0 };
        }
        let refund_delta = if slot.new.is_zero() { clear_refund } else { 0 };
        return SstoreOutcome { cost: SSTORE_RESET_COST, refund_delta };
    }

    let mut refund_delta = 0i64;
    if !slot.original.is_zero() {
        if slot.current.is_zero() {
            refund_delta -= clear_refund;
        } else if slot.new.is_zero() {
            refund_delta += clear_refund;
        }
    }
    if slot.original == slot.new {
        refund_delta += if slot.original.is_zero() {
            SSTORE_SET_COST as i64 - WARM_STORAGE_READ_COST as i64
        } else {
            SSTORE_RESET_COST as i64 - WARM_STORAGE_READ_COST as i64
        };
    }
    SstoreOutcome { cost: WARM_STORAGE_READ_COST, refund_delta }
}

/// A `CALL`-family dynamic-cost computation's inputs.
#[derive(Debug, Clone, Copy)]
pub struct CallCostInput {
    /// The base per-fork/access-list cost of touching the target address.
    pub base_access_cost: u64,
    /// Whether nonzero value accompanies the call (`CALL`/`CALLCODE` only).
    pub transfers_value: bool,
    /// Whether the call would create a new account (a value-bearing `CALL` to an absent account,
    /// post-Spurious-Dragon only).
    pub creates_account: bool,
    /// Gas remaining in the caller's frame after the base cost is charged.
    pub gas_available: u64,
    /// The gas explicitly requested by the caller (the `gas` stack argument).
    pub requested_gas: u64,
}

/// The result of a `CALL`-family dynamic-cost computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallCostOutcome {
    /// The total gas charged to the caller's frame (base access cost plus value/new-account
    /// surcharges; the forwarded child gas is charged separately as it is returned on success).
    pub cost: u64,
    /// The gas budget to hand the child frame, after the EIP-150 63/64 cap and stipend.
    pub child_gas_limit: u64,
}

/// Computes a `CALL`-family instruction's gas cost and the gas to forward to the child,
/// applying EIP-150's `floor(gas * 63/64)` cap and the value-transfer stipend.
pub fn call_cost(input: CallCostInput) -> EvmResult<CallCostOutcome> {
    let mut cost = input.base_access_cost;
    if input.transfers_value {
        cost += CALL_VALUE_COST;
    }
    if input.creates_account {
        cost += NEW_ACCOUNT_COST;
    }
    let after_base = input.gas_available.checked_sub(cost).ok_or(EvmError::OutOfGas)?;
    let cap = after_base - after_base / CALL_GAS_RETENTION_DENOMINATOR;
    let mut child_gas_limit = input.requested_gas.min(cap);
    if input.transfers_value {
        child_gas_limit += CALL_STIPEND;
    }
    Ok(CallCostOutcome { cost, child_gas_limit })
}

/// A frame's signed gas budget: a 64-bit signed integer that never wraps; charges past zero fail
/// with [`EvmError::OutOfGas`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    remaining: i64,
}

impl GasMeter {
    /// Creates a meter with `limit` gas available.
    pub const fn new(limit: u64) -> Self {
        Self { remaining: limit as i64 }
    }

    /// The gas remaining in this frame.
    pub const fn remaining(&self) -> u64 {
        self.remaining as u64
    }

    /// Charges `amount`, failing with `OutOfGas` if it would drive the balance negative.
    pub fn charge(&mut self, amount: u64) -> EvmResult<()> {
        let amount = amount as i64;
        if self.remaining < amount {
            self.remaining = 0;
            return Err(EvmError::OutOfGas);
        }
        self.remaining -= amount;
        Ok(())
    }

    /// Returns `amount` of previously-charged gas, as happens when a child call returns unused
    /// gas to its parent.
    pub fn refund(&mut self, amount: u64) {
        self.remaining = self.remaining.saturating_add(amount as i64);
    }

    /// Consumes all remaining gas, as happens on an exceptional halt.
    pub fn burn_all(&mut self) -> u64 {
        let burned = self.remaining as u64;
        self.remaining = 0;
        burned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn gas_meter_charges_and_underflows() {
        let mut meter = GasMeter::new(10);
        meter.charge(7).unwrap();
        assert_eq!(meter.remaining(), 3);
        assert!(matches!(meter.charge(4), Err(EvmError::OutOfGas)));
        assert_eq!(meter.remaining(), 0);
    }

    #[test]
    fn gas_meter_refund_restores_balance() {
        let mut meter = GasMeter::new(10);
        meter.charge(10).unwrap();
        meter.refund(4);
        assert_eq!(meter.remaining(), 4);
    }

    #[test]
    fn memory_expansion_is_marginal() {
        assert_eq!(memory_expansion_cost(0, 1), 3);
        let first = memory_expansion_cost(0, 10);
        let second = memory_expansion_cost(10, 20);
        assert!(second > first);
        assert_eq!(memory_expansion_cost(10, 10), 0);
    }

    #[test]
    fn sstore_zero_to_nonzero_costs_20000_no_refund() {
        let outcome = sstore_outcome(
            ForkId::Berlin,
            SstoreSlot { original: U256::ZERO, current: U256::ZERO, new: U256::from(1_u64) },
        );
        assert_eq!(outcome, SstoreOutcome { cost: SSTORE_SET_COST, refund_delta: 0 });
    }

    #[test]
    fn sstore_reset_to_zero_refunds_clear_amount() {
        let outcome = sstore_outcome(
            ForkId::Berlin,
            SstoreSlot {
                original: U256::from(1_u64),
                current: U256::from(1_u64),
                new: U256::ZERO,
            },
        );
        assert_eq!(
            outcome,
            SstoreOutcome {
                cost: SSTORE_RESET_COST,
                refund_delta: SSTORE_CLEAR_REFUND_PRE_LONDON as i64
            }
        );
    }

    #[test]
    fn sstore_noop_rewrite_is_warm_read_cost() {
        let outcome = sstore_outcome(
            ForkId::Berlin,
            SstoreSlot {
                original: U256::from(1_u64),
                current: U256::from(1_u64),
                new: U256::from(1_u64),
            },
        );
        assert_eq!(outcome, SstoreOutcome { cost: WARM_STORAGE_READ_COST, refund_delta: 0 });
    }

    #[test]
    fn call_cost_caps_forwarded_gas_at_63_64() {
        let outcome = call_cost(CallCostInput {
            base_access_cost: 0,
            transfers_value: false,
            creates_account: false,
            gas_available: 64000,
            requested_gas: 64000,
        })
        .unwrap();
        assert_eq!(outcome.child_gas_limit, 64000 - 64000 / 64);
    }

    #[test]
    fn call_cost_adds_stipend_for_value_transfer() {
        let outcome = call_cost(CallCostInput {
            base_access_cost: 0,
            transfers_value: true,
            creates_account: false,
            gas_available: 100000,
            requested_gas: 1000,
        })
        .unwrap();
        assert_eq!(outcome.child_gas_limit, 1000 + CALL_STIPEND);
        assert_eq!(outcome.cost, CALL_VALUE_COST);
    }
}
