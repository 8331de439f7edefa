//! Per-transaction processing: validation, interpreter dispatch, and receipt construction.

use crate::{
    errors::{TxError, TxResult},
    intrinsic_gas::intrinsic_gas,
};
use alloy_consensus::{
    Eip658Value, Receipt, ReceiptEnvelope, ReceiptWithBloom, Signed, Transaction, TxEnvelope,
    TxLegacy,
};
use alloy_primitives::{logs_bloom, Address, Log, U256};
use execore_chainspec::ForkId;
use execore_evm::{BlockContext, CallKind, Message, TxContext};
use execore_kv::KvStore;
use execore_state::AccountsCache;

/// The outcome of successfully processing one transaction: its receipt and the gas it consumed,
/// to be folded into the block's cumulative gas counter.
#[derive(Debug)]
pub struct TxOutcome {
    /// The transaction's receipt.
    pub receipt: ReceiptEnvelope,
    /// The gas this transaction consumed (after refunds).
    pub gas_used: u64,
}

/// Recovers `tx`'s sender and its inner, per-type fields relevant to fee and call setup.
struct RecoveredTx<'a> {
    sender: Address,
    nonce: u64,
    gas_limit: u64,
    max_fee_per_gas: u64,
    max_priority_fee_per_gas: u64,
    to: alloy_primitives::TxKind,
    value: U256,
    input: &'a alloy_primitives::Bytes,
    access_list: Vec<(Address, Vec<U256>)>,
}

fn recover<'a>(tx: &'a TxEnvelope) -> TxResult<RecoveredTx<'a>> {
    fn recover_sender<T>(signed: &Signed<T>) -> TxResult<Address> {
        signed.recover_signer().map_err(TxError::InvalidSignature)
    }

    match tx {
        TxEnvelope::Legacy(signed) => {
            let inner = signed.tx();
            Ok(RecoveredTx {
                sender: recover_sender(signed)?,
                nonce: inner.nonce,
                gas_limit: inner.gas_limit,
                max_fee_per_gas: inner.gas_price,
                max_priority_fee_per_gas: inner.gas_price,
                to: inner.to,
                value: inner.value,
                input: &inner.input,
                access_list: Vec::new(),
            })
        }
        TxEnvelope::Eip2930(signed) => {
            let inner = signed.tx();
            Ok(RecoveredTx {
                sender: recover_sender(signed)?,
                nonce: inner.nonce,
                gas_limit: inner.gas_limit,
                max_fee_per_gas: inner.gas_price,
                max_priority_fee_per_gas: inner.gas_price,
                to: inner.to,
                value: inner.value,
                input: &inner.input,
                access_list: unpack_access_list(inner.access_list.iter()),
            })
        }
        TxEnvelope::Eip1559(signed) => {
            let inner = signed.tx();
            Ok(RecoveredTx {
                sender: recover_sender(signed)?,
                nonce: inner.nonce,
                gas_limit: inner.gas_limit,
                max_fee_per_gas: inner.max_fee_per_gas,
                max_priority_fee_per_gas: inner.max_priority_fee_per_gas,
                to: inner.to,
                value: inner.value,
                input: &inner.input,
                access_list: unpack_access_list(inner.access_list.iter()),
            })
        }
        _ => Err(TxError::UnsupportedType),
    }
}

fn unpack_access_list<'a>(
    items: impl Iterator<Item = &'a alloy_eips::eip2930::AccessListItem>,
) -> Vec<(Address, Vec<U256>)> {
    items
        .map(|item| {
            (item.address, item.storage_keys.iter().map(|key| U256::from_be_bytes(key.0)).collect())
        })
        .collect()
}

/// Validates an EIP-1559 transaction's fee fields against the block's base fee and derives the
/// effective gas price every transaction type is charged at.
fn derive_effective_gas_price(
    is_eip1559: bool,
    base_fee: u64,
    max_fee_per_gas: u64,
    max_priority_fee_per_gas: u64,
) -> TxResult<u64> {
    if !is_eip1559 {
        return Ok(max_fee_per_gas);
    }
    if max_fee_per_gas < base_fee {
        return Err(TxError::FeeTooLow { max_fee: max_fee_per_gas, base_fee });
    }
    if max_priority_fee_per_gas > max_fee_per_gas {
        return Err(TxError::PriorityFeeTooHigh { priority: max_priority_fee_per_gas, max_fee: max_fee_per_gas });
    }
    Ok(base_fee.saturating_add(max_priority_fee_per_gas.min(max_fee_per_gas.saturating_sub(base_fee))))
}

/// Validates and executes a single transaction against `cache`, charging gas, running the
/// interpreter, crediting the coinbase, and building the transaction's receipt.
///
/// `block_gas_remaining` is the gas left in the block before this transaction; `cumulative_gas_used`
/// is the running total across the block so far, which the receipt's `cumulativeGasUsed` field
/// reports inclusive of this transaction.
#[allow(clippy::too_many_arguments)]
pub fn process_transaction<S: KvStore>(
    cache: &mut AccountsCache<'_, S>,
    fork: ForkId,
    config: &execore_chainspec::ChainConfig,
    block: &BlockContext,
    tx: &TxEnvelope,
    block_gas_remaining: u64,
    cumulative_gas_used: u64,
) -> TxResult<TxOutcome> {
    let recovered = recover(tx)?;

    if let Some(tx_chain_id) = tx.chain_id() {
        if tx_chain_id != config.chain_id {
            return Err(TxError::ChainIdMismatch { tx: tx_chain_id, expected: config.chain_id });
        }
    }

    let account = cache.get_account(recovered.sender).map_err(TxError::Interpreter)?;
    if account.nonce != recovered.nonce {
        return Err(TxError::InvalidNonce { account: account.nonce, tx: recovered.nonce });
    }

    let base_fee = block.base_fee.unwrap_or(0);
    let is_eip1559 = matches!(tx, TxEnvelope::Eip1559(_));
    let effective_gas_price = derive_effective_gas_price(
        is_eip1559,
        base_fee,
        recovered.max_fee_per_gas,
        recovered.max_priority_fee_per_gas,
    )?;

    if recovered.gas_limit > block_gas_remaining {
        return Err(TxError::GasLimitExceeded {
            tx_limit: recovered.gas_limit,
            block_remaining: block_gas_remaining,
        });
    }

    let required = intrinsic_gas(tx);
    if recovered.gas_limit < required {
        return Err(TxError::IntrinsicGasTooLow { required, limit: recovered.gas_limit });
    }

    let upfront_cost =
        U256::from(recovered.gas_limit) * U256::from(effective_gas_price) + recovered.value;
    if account.balance < upfront_cost {
        return Err(TxError::InsufficientBalance { balance: account.balance, cost: upfront_cost });
    }

    cache
        .sub_balance(recovered.sender, U256::from(recovered.gas_limit) * U256::from(effective_gas_price))
        .map_err(TxError::Interpreter)?;
    cache.set_nonce(recovered.sender, recovered.nonce + 1).map_err(TxError::Interpreter)?;

    cache.reset_access_list();
    cache.warm_address(recovered.sender);
    if let alloy_primitives::TxKind::Call(to) = recovered.to {
        cache.warm_address(to);
    }
    if fork.access_list_enabled() {
        if fork >= ForkId::Shanghai {
            cache.warm_address(block.coinbase);
        }
        for (address, keys) in &recovered.access_list {
            cache.warm_address(*address);
            for key in keys {
                cache.warm_slot(*address, *key);
            }
        }
    }

    let (kind, recipient) = match recovered.to {
        alloy_primitives::TxKind::Call(to) => (CallKind::Call, to),
        alloy_primitives::TxKind::Create => {
            (CallKind::Create, contract_creation_address(recovered.sender, account.nonce))
        }
    };
    let message = Message::top_level(
        kind,
        recovered.sender,
        recipient,
        recovered.value,
        recovered.input.clone(),
        recovered.gas_limit - required,
    );
    let tx_context = TxContext { origin: recovered.sender, gas_price: effective_gas_price };

    let outcome = execore_evm::execute(cache, fork, block, &tx_context, message)?;
    let success = matches!(outcome.halt, execore_evm::Halt::Return { .. });
    let logs: Vec<Log> = outcome.logs;

    let gas_used_before_refund = recovered.gas_limit - outcome.gas_remaining;
    let refund_cap = gas_used_before_refund / fork.refund_cap_denominator();
    let applied_refund = (outcome.refund.max(0) as u64).min(refund_cap);
    let gas_used = gas_used_before_refund - applied_refund;

    let unused_gas = recovered.gas_limit - gas_used;
    cache
        .add_balance(recovered.sender, U256::from(unused_gas) * U256::from(effective_gas_price))
        .map_err(TxError::Interpreter)?;

    let miner_fee = if fork.has_base_fee() {
        effective_gas_price.saturating_sub(base_fee)
    } else {
        effective_gas_price
    };
    cache
        .add_balance(block.coinbase, U256::from(gas_used) * U256::from(miner_fee))
        .map_err(TxError::Interpreter)?;
    cache.mark_touched(block.coinbase);

    if fork < ForkId::Byzantium {
        cache.persist(fork.empty_account_reaping()).map_err(TxError::Interpreter)?;
    } else {
        cache.apply_selfdestructs().map_err(TxError::Interpreter)?;
    }

    let cumulative = cumulative_gas_used + gas_used;
    let bloom = logs_bloom(logs.iter());
    let status = if fork >= ForkId::Byzantium {
        Eip658Value::Eip658(success)
    } else {
        Eip658Value::PostState(cache.root())
    };
    let receipt = Receipt { status, cumulative_gas_used: cumulative, logs };
    let receipt_with_bloom = ReceiptWithBloom::new(receipt, bloom);

    let envelope = match tx {
        TxEnvelope::Legacy(_) => ReceiptEnvelope::Legacy(receipt_with_bloom),
        TxEnvelope::Eip2930(_) => ReceiptEnvelope::Eip2930(receipt_with_bloom),
        TxEnvelope::Eip1559(_) => ReceiptEnvelope::Eip1559(receipt_with_bloom),
        _ => unreachable!("recover rejects unsupported transaction types"),
    };

    Ok(TxOutcome { receipt: envelope, gas_used })
}

fn contract_creation_address(sender: Address, sender_nonce: u64) -> Address {
    sender.create(sender_nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::legacy_ignores_base_fee(false, 100, 50, 50, Ok(50))]
    #[case::eip1559_capped_by_max_fee(true, 10, 100, 100, Ok(100))]
    #[case::eip1559_priority_under_headroom(true, 10, 100, 5, Ok(15))]
    #[case::eip1559_fee_too_low(true, 100, 50, 10, Err(()))]
    #[case::eip1559_priority_too_high(true, 10, 100, 200, Err(()))]
    fn effective_gas_price_table(
        #[case] is_eip1559: bool,
        #[case] base_fee: u64,
        #[case] max_fee_per_gas: u64,
        #[case] max_priority_fee_per_gas: u64,
        #[case] expected: Result<u64, ()>,
    ) {
        let actual = derive_effective_gas_price(is_eip1559, base_fee, max_fee_per_gas, max_priority_fee_per_gas);
        assert_eq!(actual.map_err(|_| ()), expected);
    }

    #[test]
    fn legacy_tx_recovers_sender_fee() {
        use alloy_consensus::SignableTransaction;
        use alloy_primitives::{Signature, TxKind};

        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 7,
            gas_limit: 21_000,
            to: TxKind::Call(Address::ZERO),
            value: U256::ZERO,
            input: Default::default(),
        };
        let envelope = TxEnvelope::Legacy(tx.into_signed(Signature::test_signature()));
        let recovered = recover(&envelope).unwrap();
        assert_eq!(recovered.max_fee_per_gas, 7);
        assert_eq!(recovered.gas_limit, 21_000);
    }
}
