//! `persistBlocks` — batch block validation, execution, and commitment.

use crate::{
    errors::{BadBlockKind, BlockError, BlockResult},
    tx_processor::process_transaction,
};
use alloy_consensus::{Header, ReceiptEnvelope, TxEnvelope};
use alloy_primitives::{keccak256, logs_bloom, Bloom, B256};
use execore_chainspec::{
    base_block_reward, effective_parent_gas_limit, miner_ommer_inclusion_reward, next_base_fee,
    ommer_author_reward, validate_gas_limit, ChainConfig,
};
use execore_evm::BlockContext;
use execore_kv::{KvStore, TransactionalKvStore};
use execore_state::AccountsCache;
use execore_trie::ordered_trie_root;

/// A block's transaction list and ommer (uncle) headers — the counterpart to a canonical
/// `Header` that `persistBlocks` validates and executes.
#[derive(Debug, Clone)]
pub struct BlockBody {
    /// The block's transactions, in inclusion order.
    pub transactions: Vec<TxEnvelope>,
    /// Headers of included ommer (uncle) blocks.
    pub ommers: Vec<Header>,
}

fn ommers_hash(ommers: &[Header]) -> B256 {
    use alloy_rlp::Encodable;
    let mut buf = Vec::new();
    alloy_rlp::Header { list: true, payload_length: ommers.iter().map(Encodable::length).sum() }
        .encode(&mut buf);
    for ommer in ommers {
        ommer.encode(&mut buf);
    }
    keccak256(&buf)
}

fn transactions_root(transactions: &[TxEnvelope]) -> B256 {
    use alloy_eips::eip2718::Encodable2718;
    ordered_trie_root(transactions, |tx, out| tx.encode_2718(out))
}

fn receipts_root(receipts: &[ReceiptEnvelope]) -> B256 {
    use alloy_eips::eip2718::Encodable2718;
    ordered_trie_root(receipts, |receipt, out| receipt.encode_2718(out))
}

/// Validates and applies `headers`/`bodies` to the chain rooted at `parent`, returning the new
/// state root of the last block applied. `headers` and `bodies` must have equal length and
/// `headers[0]`'s parent must be `parent`.
///
/// Every block is executed against a single KV transaction opened over `store`: on success the
/// transaction commits, making every block's writes durable together; on any failure it is
/// disposed, leaving `store` exactly as it was before this call.
pub fn persist_blocks<S: TransactionalKvStore>(
    store: &mut S,
    config: &ChainConfig,
    parent: &Header,
    headers: &[Header],
    bodies: &[BlockBody],
) -> BlockResult<B256> {
    assert_eq!(headers.len(), bodies.len(), "headers/bodies length mismatch");

    let mut txn = store.begin_transaction();
    let mut parent = parent.clone();
    let mut state_root = parent.state_root;

    for (header, body) in headers.iter().zip(bodies.iter()) {
        match persist_one_block(&mut txn, config, &parent, header, body) {
            Ok(root) => {
                state_root = root;
                parent = header.clone();
            }
            Err(err) => {
                txn.dispose();
                return Err(err);
            }
        }
    }

    txn.commit().map_err(BlockError::Kv)?;
    Ok(state_root)
}

fn persist_one_block<S: KvStore>(
    txn: &mut S,
    config: &ChainConfig,
    parent: &Header,
    header: &Header,
    body: &BlockBody,
) -> BlockResult<B256> {
    if header.parent_hash != parent.hash_slow() {
        return Err(BlockError::ParentNotFound);
    }

    let computed_tx_root = transactions_root(&body.transactions);
    if computed_tx_root != header.transactions_root {
        return Err(BlockError::BadBlock(BadBlockKind::TxRoot {
            declared: header.transactions_root,
            computed: computed_tx_root,
        }));
    }
    let computed_ommers_hash = ommers_hash(&body.ommers);
    if computed_ommers_hash != header.ommers_hash {
        return Err(BlockError::BadBlock(BadBlockKind::OmmersHash {
            declared: header.ommers_hash,
            computed: computed_ommers_hash,
        }));
    }

    let fork = config.fork_at(header.number);
    let parent_fork = config.fork_at(parent.number);

    if fork.has_base_fee() {
        let effective_parent_limit =
            effective_parent_gas_limit(parent.gas_limit, parent_fork.has_base_fee());
        validate_gas_limit(header.gas_limit, effective_parent_limit)
            .map_err(|e| BlockError::BadBlock(BadBlockKind::GasLimit(e)))?;

        let expected_base_fee = if parent_fork.has_base_fee() {
            next_base_fee(
                parent.gas_limit,
                parent.gas_used,
                parent.base_fee_per_gas.unwrap_or(config.initial_base_fee),
            )
        } else {
            config.initial_base_fee
        };
        let declared_base_fee = header.base_fee_per_gas.unwrap_or(0);
        if declared_base_fee != expected_base_fee {
            return Err(BlockError::BadBlock(BadBlockKind::BaseFee {
                declared: declared_base_fee,
                derived: expected_base_fee,
            }));
        }
    }

    let mut recent_block_hashes = alloy_primitives::map::HashMap::default();
    recent_block_hashes.insert(parent.number, parent.hash_slow());
    let block = BlockContext {
        chain_id: config.chain_id,
        coinbase: header.beneficiary,
        timestamp: header.timestamp,
        number: header.number,
        difficulty: header.difficulty,
        gas_limit: header.gas_limit,
        base_fee: header.base_fee_per_gas,
        recent_block_hashes,
    };

    let mut cache = AccountsCache::new(txn, parent.state_root);

    let mut receipts = Vec::with_capacity(body.transactions.len());
    let mut cumulative_gas_used = 0u64;
    for (index, tx) in body.transactions.iter().enumerate() {
        let block_gas_remaining = header.gas_limit - cumulative_gas_used;
        let outcome = process_transaction(
            &mut cache,
            fork,
            config,
            &block,
            tx,
            block_gas_remaining,
            cumulative_gas_used,
        )
        .map_err(|source| BlockError::Transaction { index, source })?;
        cumulative_gas_used += outcome.gas_used;
        receipts.push(outcome.receipt);
    }

    let base_reward = base_block_reward(fork);
    cache
        .add_balance(
            header.beneficiary,
            base_reward + miner_ommer_inclusion_reward(fork, body.ommers.len() as u64),
        )
        .map_err(BlockError::State)?;
    cache.mark_touched(header.beneficiary);
    for ommer in &body.ommers {
        cache
            .add_balance(ommer.beneficiary, ommer_author_reward(fork, header.number, ommer.number))
            .map_err(BlockError::State)?;
        cache.mark_touched(ommer.beneficiary);
    }

    let computed_state_root =
        cache.persist(fork.empty_account_reaping()).map_err(BlockError::State)?;
    if computed_state_root != header.state_root {
        return Err(BlockError::BadBlock(BadBlockKind::StateRoot {
            declared: header.state_root,
            computed: computed_state_root,
        }));
    }

    let computed_bloom = block_logs_bloom(&receipts);
    if computed_bloom != header.logs_bloom {
        return Err(BlockError::BadBlock(BadBlockKind::Bloom));
    }
    let computed_receipts_root = receipts_root(&receipts);
    if computed_receipts_root != header.receipts_root {
        return Err(BlockError::BadBlock(BadBlockKind::ReceiptRoot {
            declared: header.receipts_root,
            computed: computed_receipts_root,
        }));
    }
    if cumulative_gas_used != header.gas_used {
        return Err(BlockError::BadBlock(BadBlockKind::GasUsed {
            declared: header.gas_used,
            computed: cumulative_gas_used,
        }));
    }

    tracing::info!(
        target: "block_executor",
        number = header.number,
        gas_used = cumulative_gas_used,
        txs = body.transactions.len(),
        "applied block"
    );

    Ok(computed_state_root)
}

fn receipt_logs(receipt: &ReceiptEnvelope) -> &[alloy_primitives::Log] {
    match receipt {
        ReceiptEnvelope::Legacy(r) | ReceiptEnvelope::Eip2930(r) | ReceiptEnvelope::Eip1559(r) => {
            &r.receipt.logs
        }
        _ => &[],
    }
}

fn block_logs_bloom(receipts: &[ReceiptEnvelope]) -> Bloom {
    logs_bloom(receipts.iter().flat_map(|r| receipt_logs(r)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_roots_are_empty_trie_root() {
        let body = BlockBody { transactions: Vec::new(), ommers: Vec::new() };
        assert_eq!(transactions_root(&body.transactions), execore_trie::EMPTY_TRIE_ROOT);
    }

    #[test]
    fn empty_ommers_hash_matches_well_known_constant() {
        assert_eq!(
            ommers_hash(&[]),
            alloy_primitives::b256!(
                "1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d4934"
            )
        );
    }
}
