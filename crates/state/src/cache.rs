//! [`AccountsCache`] — the mutable in-memory view over an accounts trie and its per-account
//! storage tries.

use crate::{Account, StateError, StateResult};
use alloy_primitives::{
    map::{HashMap, HashSet},
    Address, Bytes, B256, U256,
};
use alloy_rlp::{Decodable, Encodable};
use execore_kv::KvStore;
use execore_trie::{HexaryTrie, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT};
use tracing::{debug, trace};

/// A checkpoint returned by [`AccountsCache::snapshot`], to be passed to [`AccountsCache::revert`]
/// or [`AccountsCache::commit`]. Snapshots nest the way EVM call frames do: the most recently
/// taken snapshot must be the next one reverted or committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotId(usize);

#[derive(Debug, Clone, Default)]
struct CachedAccount {
    account: Account,
    code: Option<Bytes>,
    storage: HashMap<U256, U256>,
    /// False for an account that has never existed in the trie and has not yet been touched by
    /// a value transfer, nonce bump, or code deployment in this cache.
    exists: bool,
}

/// One undoable mutation recorded since the last [`AccountsCache::snapshot`]. Reverting replays
/// the journal backwards, undoing each entry in turn.
#[derive(Debug)]
enum JournalEntry {
    AccountCreated { address: Address },
    NonceChanged { address: Address, old: u64 },
    BalanceChanged { address: Address, old: U256 },
    CodeChanged { address: Address, old_hash: B256, old_code: Option<Bytes> },
    StorageChanged { address: Address, key: U256, old: U256 },
    AddressWarmed { address: Address },
    SlotWarmed { address: Address, key: U256 },
    AccountTouched { address: Address },
    SelfDestructQueued { address: Address },
}

/// An in-memory, mutable view over a root [`Account`] trie identified by a state root, with
/// per-account storage tries, dirty tracking, and hierarchical snapshot/revert.
#[derive(Debug)]
pub struct AccountsCache<'s, S: KvStore> {
    store: &'s mut S,
    root: B256,
    storage_roots: HashMap<Address, B256>,
    accounts: HashMap<Address, CachedAccount>,
    touched: HashSet<Address>,
    warm_addresses: HashSet<Address>,
    warm_slots: HashSet<(Address, U256)>,
    selfdestructs: HashMap<Address, Address>,
    journal: Vec<JournalEntry>,
}

impl<'s, S: KvStore> AccountsCache<'s, S> {
    /// Opens a cache over the accounts trie rooted at `root`.
    pub fn new(store: &'s mut S, root: B256) -> Self {
        Self {
            store,
            root,
            storage_roots: HashMap::default(),
            accounts: HashMap::default(),
            touched: HashSet::default(),
            warm_addresses: HashSet::default(),
            warm_slots: HashSet::default(),
            selfdestructs: HashMap::default(),
            journal: Vec::new(),
        }
    }

    fn accounts_trie(&mut self) -> HexaryTrie<'_, S> {
        HexaryTrie::new_secure(&mut *self.store, self.root)
    }

    fn storage_trie(&mut self, address: Address) -> HexaryTrie<'_, S> {
        let root = self.storage_roots.get(&address).copied().unwrap_or(EMPTY_TRIE_ROOT);
        HexaryTrie::new_secure(&mut *self.store, root)
    }

    fn load(&mut self, address: Address) -> StateResult<&mut CachedAccount> {
        if !self.accounts.contains_key(&address) {
            let path = address.as_slice();
            let loaded = match self.accounts_trie().get(path)? {
                Some(bytes) => {
                    let account = Account::decode(&mut bytes.as_ref())?;
                    self.storage_roots.insert(address, account.storage_root);
                    CachedAccount { account, code: None, storage: HashMap::default(), exists: true }
                }
                None => CachedAccount::default(),
            };
            self.accounts.insert(address, loaded);
        }
        Ok(self.accounts.get_mut(&address).expect("just inserted"))
    }

    /// Loads (or returns the cached view of) the account at `address`. Absent accounts return the
    /// default (zero) [`Account`] without being materialized in the trie.
    pub fn get_account(&mut self, address: Address) -> StateResult<Account> {
        Ok(self.load(address)?.account)
    }

    /// Returns the code hash of the account at `address`.
    pub fn get_code_hash(&mut self, address: Address) -> StateResult<B256> {
        Ok(self.load(address)?.account.code_hash)
    }

    /// Returns the code of the account at `address`, fetching it from the KV store by code hash
    /// on first access.
    pub fn get_code(&mut self, address: Address) -> StateResult<Bytes> {
        let code_hash = self.load(address)?.account.code_hash;
        if code_hash == EMPTY_CODE_HASH {
            return Ok(Bytes::new());
        }
        if let Some(code) = self.accounts.get(&address).and_then(|a| a.code.clone()) {
            return Ok(code);
        }
        let code = self.store.get(code_hash.as_slice()).map_err(execore_trie::TrieError::Kv)?;
        let code = Bytes::from(code.unwrap_or_default());
        self.accounts.get_mut(&address).expect("loaded above").code = Some(code.clone());
        Ok(code)
    }

    /// Reads storage slot `key` of `address`. Absent slots read as zero.
    pub fn get_storage(&mut self, address: Address, key: U256) -> StateResult<U256> {
        self.load(address)?;
        if let Some(value) = self.accounts.get(&address).and_then(|a| a.storage.get(&key)).copied()
        {
            return Ok(value);
        }
        let hashed_key = key.to_be_bytes::<32>();
        let value = match self.storage_trie(address).get(&hashed_key)? {
            Some(bytes) => U256::decode(&mut bytes.as_ref())?,
            None => U256::ZERO,
        };
        self.accounts.get_mut(&address).expect("loaded above").storage.insert(key, value);
        Ok(value)
    }

    /// Overwrites storage slot `key` of `address`.
    pub fn set_storage(&mut self, address: Address, key: U256, value: U256) -> StateResult<()> {
        self.mark_touched(address);
        let old = self.get_storage(address, key)?;
        if old == value {
            return Ok(());
        }
        let entry = self.load(address)?;
        entry.storage.insert(key, value);
        self.journal.push(JournalEntry::StorageChanged { address, key, old });
        Ok(())
    }

    /// Sets the account's nonce.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> StateResult<()> {
        self.mark_touched(address);
        let entry = self.load(address)?;
        let old = entry.account.nonce;
        if old == nonce {
            return Ok(());
        }
        entry.account.nonce = nonce;
        self.create_if_new(address);
        self.journal.push(JournalEntry::NonceChanged { address, old });
        Ok(())
    }

    /// Sets the account's balance.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> StateResult<()> {
        self.mark_touched(address);
        let entry = self.load(address)?;
        let old = entry.account.balance;
        if old == balance {
            return Ok(());
        }
        entry.account.balance = balance;
        self.create_if_new(address);
        self.journal.push(JournalEntry::BalanceChanged { address, old });
        Ok(())
    }

    /// Adds `delta` to the account's balance.
    pub fn add_balance(&mut self, address: Address, delta: U256) -> StateResult<()> {
        if delta.is_zero() {
            self.mark_touched(address);
            return Ok(());
        }
        let balance = self.get_account(address)?.balance;
        self.set_balance(address, balance.saturating_add(delta))
    }

    /// Subtracts `delta` from the account's balance. The caller must have already checked that
    /// the balance is sufficient.
    pub fn sub_balance(&mut self, address: Address, delta: U256) -> StateResult<()> {
        if delta.is_zero() {
            self.mark_touched(address);
            return Ok(());
        }
        let balance = self.get_account(address)?.balance;
        self.set_balance(address, balance.saturating_sub(delta))
    }

    /// Sets the account's code, updating its code hash.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> StateResult<()> {
        self.mark_touched(address);
        let code_hash = alloy_primitives::keccak256(&code);
        self.store
            .put(code_hash.as_slice(), code.to_vec())
            .map_err(execore_trie::TrieError::Kv)?;
        let entry = self.load(address)?;
        let old_hash = entry.account.code_hash;
        let old_code = entry.code.clone();
        entry.account.code_hash = code_hash;
        entry.code = Some(code);
        self.create_if_new(address);
        self.journal.push(JournalEntry::CodeChanged { address, old_hash, old_code });
        Ok(())
    }

    fn create_if_new(&mut self, address: Address) {
        let entry = self.accounts.get_mut(&address).expect("loaded by caller");
        if !entry.exists {
            entry.exists = true;
            self.journal.push(JournalEntry::AccountCreated { address });
        }
    }

    /// Marks `address` as touched by this transaction (referenced by an opcode, value transfer,
    /// or selfdestruct). Touched-but-empty accounts are pruned by [`Self::persist`] when
    /// `reap_empty` is set (post-Spurious-Dragon).
    pub fn mark_touched(&mut self, address: Address) {
        if self.touched.insert(address) {
            self.journal.push(JournalEntry::AccountTouched { address });
        }
    }

    /// Returns whether `address` has been touched since the cache was opened.
    pub fn is_touched(&self, address: Address) -> bool {
        self.touched.contains(&address)
    }

    /// Queues `address` for deletion at the next [`Self::persist`], crediting its full balance to
    /// `beneficiary` immediately (burned if `beneficiary == address`).
    pub fn self_destruct(&mut self, address: Address, beneficiary: Address) -> StateResult<()> {
        self.mark_touched(address);
        if beneficiary != address {
            self.mark_touched(beneficiary);
            let balance = self.get_account(address)?.balance;
            self.add_balance(beneficiary, balance)?;
        }
        self.set_balance(address, U256::ZERO)?;
        if self.selfdestructs.insert(address, beneficiary).is_none() {
            self.journal.push(JournalEntry::SelfDestructQueued { address });
        }
        Ok(())
    }

    /// Returns whether `address` is warm (EIP-2929): previously accessed in this transaction, or
    /// pre-warmed from the header's precompile set or an EIP-2930 access list.
    pub fn is_warm_address(&self, address: Address) -> bool {
        self.warm_addresses.contains(&address)
    }

    /// Marks `address` warm, returning whether it was previously cold (the caller should charge
    /// the cold-access surcharge exactly when this returns `true`).
    pub fn warm_address(&mut self, address: Address) -> bool {
        let was_cold = self.warm_addresses.insert(address);
        if was_cold {
            self.journal.push(JournalEntry::AddressWarmed { address });
        }
        was_cold
    }

    /// Marks `(address, key)` warm, returning whether it was previously cold (the caller should
    /// charge the cold-access surcharge exactly when this returns `true`).
    pub fn warm_slot(&mut self, address: Address, key: U256) -> bool {
        let was_cold = self.warm_slots.insert((address, key));
        if was_cold {
            self.journal.push(JournalEntry::SlotWarmed { address, key });
        }
        was_cold
    }

    /// Returns whether `(address, key)` has already been accessed in this transaction.
    pub fn is_warm_slot(&self, address: Address, key: U256) -> bool {
        self.warm_slots.contains(&(address, key))
    }

    /// Takes a snapshot of the cache's current state, to be later passed to [`Self::revert`] or
    /// [`Self::commit`]. Snapshots must be released in LIFO order, matching call-frame nesting.
    pub fn snapshot(&mut self) -> SnapshotId {
        SnapshotId(self.journal.len())
    }

    /// Reverts every mutation recorded since `snapshot` was taken.
    pub fn revert(&mut self, snapshot: SnapshotId) -> StateResult<()> {
        if snapshot.0 > self.journal.len() {
            return Err(StateError::InvalidSnapshot { given: snapshot.0, current: self.journal.len() });
        }
        while self.journal.len() > snapshot.0 {
            match self.journal.pop().expect("length checked above") {
                JournalEntry::AccountCreated { address } => {
                    if let Some(entry) = self.accounts.get_mut(&address) {
                        entry.exists = false;
                    }
                }
                JournalEntry::NonceChanged { address, old } => {
                    self.accounts.get_mut(&address).expect("journaled").account.nonce = old;
                }
                JournalEntry::BalanceChanged { address, old } => {
                    self.accounts.get_mut(&address).expect("journaled").account.balance = old;
                }
                JournalEntry::CodeChanged { address, old_hash, old_code } => {
                    let entry = self.accounts.get_mut(&address).expect("journaled");
                    entry.account.code_hash = old_hash;
                    entry.code = old_code;
                }
                JournalEntry::StorageChanged { address, key, old } => {
                    self.accounts
                        .get_mut(&address)
                        .expect("journaled")
                        .storage
                        .insert(key, old);
                }
                JournalEntry::AddressWarmed { address } => {
                    self.warm_addresses.remove(&address);
                }
                JournalEntry::SlotWarmed { address, key } => {
                    self.warm_slots.remove(&(address, key));
                }
                JournalEntry::AccountTouched { address } => {
                    self.touched.remove(&address);
                }
                JournalEntry::SelfDestructQueued { address } => {
                    self.selfdestructs.remove(&address);
                }
            }
        }
        Ok(())
    }

    /// Releases `snapshot` without undoing anything: the mutations made since it was taken become
    /// part of the enclosing frame and remain undoable by an outer [`Self::revert`].
    pub fn commit(&mut self, snapshot: SnapshotId) -> StateResult<()> {
        if snapshot.0 > self.journal.len() {
            return Err(StateError::InvalidSnapshot { given: snapshot.0, current: self.journal.len() });
        }
        Ok(())
    }

    /// Removes every account queued by [`Self::self_destruct`] from the cache and its accounts
    /// trie entry, without touching any other dirty account or recomputing the trie root. Must be
    /// called once per transaction, regardless of fork: a self-destructed account is gone by the
    /// end of the transaction that destroyed it, not merely at the next [`Self::persist`], so a
    /// later transaction in the same block must see an empty account at that address.
    pub fn apply_selfdestructs(&mut self) -> StateResult<()> {
        let destroyed: Vec<Address> = self.selfdestructs.keys().copied().collect();
        for address in destroyed {
            self.accounts_trie().delete(address.as_slice())?;
            self.storage_roots.remove(&address);
            self.accounts.remove(&address);
        }
        self.selfdestructs.clear();
        Ok(())
    }

    /// Reaps every touched account that is currently empty (EIP-161, post-Spurious-Dragon).
    pub fn reap_empty_touched_accounts(&mut self) -> StateResult<()> {
        let candidates: Vec<Address> = self.touched.iter().copied().collect();
        for address in candidates {
            if self.load(address)?.account.is_empty() {
                self.selfdestructs.insert(address, address);
            }
        }
        Ok(())
    }

    /// Flushes every dirty account (and its dirty storage trie) into the underlying KV store and
    /// returns the new accounts-trie root. `reap_empty` selects EIP-161 semantics (post-Spurious-
    /// Dragon): touched accounts left empty after execution are deleted rather than materialized.
    pub fn persist(&mut self, reap_empty: bool) -> StateResult<B256> {
        if reap_empty {
            self.reap_empty_touched_accounts()?;
        }
        self.apply_selfdestructs()?;

        let dirty: Vec<Address> = self.accounts.keys().copied().collect();

        for address in dirty {
            let (storage, exists) = {
                let entry = self.accounts.get(&address).expect("iterating cached keys");
                (entry.storage.clone(), entry.exists)
            };
            if !exists && storage.is_empty() {
                continue;
            }

            let mut storage_root = self.storage_roots.get(&address).copied().unwrap_or(EMPTY_TRIE_ROOT);
            if !storage.is_empty() {
                let mut trie = HexaryTrie::new_secure(&mut *self.store, storage_root);
                for (key, value) in &storage {
                    let hashed_key = key.to_be_bytes::<32>();
                    if value.is_zero() {
                        trie.delete(&hashed_key)?;
                    } else {
                        let mut buf = Vec::new();
                        value.encode(&mut buf);
                        trie.put(&hashed_key, buf.into())?;
                    }
                }
                storage_root = trie.root_hash()?;
                self.storage_roots.insert(address, storage_root);
            }

            let entry = self.accounts.get_mut(&address).expect("iterating cached keys");
            entry.account.storage_root = storage_root;
            entry.storage.clear();

            let mut buf = Vec::with_capacity(entry.account.length());
            entry.account.encode(&mut buf);
            self.accounts_trie().put(address.as_slice(), buf.into())?;
        }

        self.selfdestructs.clear();
        self.touched.clear();
        self.warm_addresses.clear();
        self.warm_slots.clear();
        self.journal.clear();

        self.root = self.accounts_trie().root_hash()?;
        debug!(target: "state", root = %self.root, "persisted accounts cache");
        Ok(self.root)
    }

    /// Returns the current accounts-trie root without flushing dirty state. Equal to the last
    /// [`Self::persist`] return value, or the root the cache was opened with if nothing has been
    /// persisted yet.
    pub fn root(&self) -> B256 {
        self.root
    }

    /// Clears the EIP-2929 warm access list between transactions: each transaction starts with
    /// its own warm set, rebuilt via [`Self::warm_address`]/[`Self::warm_slot`] as it pre-warms
    /// the sender, recipient, and any EIP-2930 access list entries. Must only be called between
    /// transactions, with no snapshot outstanding.
    pub fn reset_access_list(&mut self) {
        debug_assert!(self.journal.is_empty(), "access list reset with a live snapshot");
        self.warm_addresses.clear();
        self.warm_slots.clear();
    }
}

impl<'s, S: KvStore> Drop for AccountsCache<'s, S> {
    fn drop(&mut self) {
        if !self.journal.is_empty() {
            trace!(target: "state", pending = self.journal.len(), "dropping accounts cache with unpersisted journal entries");
        }
    }
}
