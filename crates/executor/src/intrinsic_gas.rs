//! Intrinsic gas: the fixed transaction-shape cost charged before any interpreter code runs.

use alloy_consensus::{Transaction, TxEnvelope};

/// `G_TRANSACTION`: the base cost of any transaction.
const TX_BASE_COST: u64 = 21_000;
/// `G_TXCREATE`: additional cost for a contract-creation transaction (EIP-2).
const TX_CREATE_COST: u64 = 32_000;
/// `G_TXDATANONZERO`: per non-zero calldata byte.
const TX_DATA_NONZERO_COST: u64 = 16;
/// `G_TXDATAZERO`: per zero calldata byte.
const TX_DATA_ZERO_COST: u64 = 4;
/// `G_ACCESSLISTADDRESS` (EIP-2930): per address in an access list.
const ACCESS_LIST_ADDRESS_COST: u64 = 2_400;
/// `G_ACCESSLISTSTORAGEKEY` (EIP-2930): per storage key in an access list.
const ACCESS_LIST_STORAGE_KEY_COST: u64 = 1_900;

/// Computes `tx`'s intrinsic gas: the base transaction cost, plus a contract-creation surcharge,
/// plus a per-byte calldata cost, plus an EIP-2930 access-list surcharge.
pub fn intrinsic_gas(tx: &TxEnvelope) -> u64 {
    let mut cost = TX_BASE_COST;

    if tx.to().is_create() {
        cost += TX_CREATE_COST;
    }

    for byte in tx.input().iter() {
        cost += if *byte == 0 { TX_DATA_ZERO_COST } else { TX_DATA_NONZERO_COST };
    }

    if let Some(access_list) = tx.access_list() {
        for item in access_list.iter() {
            cost += ACCESS_LIST_ADDRESS_COST;
            cost += item.storage_keys.len() as u64 * ACCESS_LIST_STORAGE_KEY_COST;
        }
    }

    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{SignableTransaction, TxLegacy};
    use alloy_primitives::{address, bytes, Signature, TxKind, U256};
    use rstest::rstest;

    fn legacy_tx(input: alloy_primitives::Bytes, to: TxKind) -> TxEnvelope {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 0,
            gas_price: 1,
            gas_limit: 100_000,
            to,
            value: U256::ZERO,
            input,
        };
        let signature = Signature::test_signature();
        TxEnvelope::Legacy(tx.into_signed(signature))
    }

    #[test]
    fn plain_call_is_base_cost() {
        let tx = legacy_tx(
            bytes!(""),
            TxKind::Call(address!("0000000000000000000000000000000000000001")),
        );
        assert_eq!(intrinsic_gas(&tx), TX_BASE_COST);
    }

    #[test]
    fn creation_adds_surcharge() {
        let tx = legacy_tx(bytes!(""), TxKind::Create);
        assert_eq!(intrinsic_gas(&tx), TX_BASE_COST + TX_CREATE_COST);
    }

    #[test]
    fn calldata_mixes_zero_and_nonzero_costs() {
        let tx = legacy_tx(
            bytes!("00010203"),
            TxKind::Call(address!("0000000000000000000000000000000000000001")),
        );
        assert_eq!(intrinsic_gas(&tx), TX_BASE_COST + TX_DATA_ZERO_COST + 3 * TX_DATA_NONZERO_COST);
    }

    #[rstest]
    #[case::empty(bytes!(""), 0, 0)]
    #[case::all_zero(bytes!("000000"), 3, 0)]
    #[case::all_nonzero(bytes!("010203"), 0, 3)]
    #[case::mixed(bytes!("00ff00ff"), 2, 2)]
    fn calldata_cost_table(
        #[case] input: alloy_primitives::Bytes,
        #[case] zero_bytes: u64,
        #[case] nonzero_bytes: u64,
    ) {
        let tx = legacy_tx(input, TxKind::Call(address!("0000000000000000000000000000000000000001")));
        let expected = TX_BASE_COST + zero_bytes * TX_DATA_ZERO_COST + nonzero_bytes * TX_DATA_NONZERO_COST;
        assert_eq!(intrinsic_gas(&tx), expected);
    }
}
