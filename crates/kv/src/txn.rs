//! Scoped transactions over a [`KvStore`].

use crate::{KvError, KvResult, KvStore};
use std::collections::HashMap;

/// A buffered overlay of writes against a `KvStore`, exposing `commit`/`dispose` semantics.
///
/// Reads observe the enclosing store's committed state plus any writes already buffered in this
/// transaction. Dropping an uncommitted `Txn` discards all buffered writes, equivalent to an
/// explicit [`Txn::dispose`] — this gives block-import cancellation for free: the caller just
/// drops the transaction.
#[derive(Debug)]
pub struct Txn<'a, S: KvStore> {
    store: &'a mut S,
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
    closed: bool,
}

impl<'a, S: KvStore> Txn<'a, S> {
    pub(crate) fn new(store: &'a mut S) -> Self {
        Self { store, overlay: HashMap::new(), closed: false }
    }

    /// Reads a key, preferring the transaction's buffered overlay over the underlying store.
    pub fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        match self.overlay.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.store.get(key),
        }
    }

    /// Buffers a write. Not visible to the underlying store until [`Txn::commit`].
    pub fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.overlay.insert(key.to_vec(), Some(value));
    }

    /// Buffers a deletion. Not visible to the underlying store until [`Txn::commit`].
    pub fn del(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), None);
    }

    /// Flushes all buffered writes into the underlying store, making them durable.
    pub fn commit(mut self) -> KvResult<()> {
        if self.closed {
            return Err(KvError::AlreadyClosed);
        }
        for (key, value) in self.overlay.drain() {
            match value {
                Some(value) => self.store.put(&key, value)?,
                None => self.store.del(&key)?,
            }
        }
        self.closed = true;
        Ok(())
    }

    /// Discards all buffered writes. Equivalent to letting the transaction drop uncommitted.
    pub fn dispose(mut self) {
        self.overlay.clear();
        self.closed = true;
    }
}

impl<'a, S: KvStore> KvStore for Txn<'a, S> {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Txn::get(self, key)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> KvResult<()> {
        Txn::put(self, key, value);
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> KvResult<()> {
        Txn::del(self, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryKv;

    #[test]
    fn commit_persists_writes() {
        let mut store = MemoryKv::new();
        store.put(b"a", b"1".to_vec()).unwrap();

        let mut txn = store.begin_transaction();
        assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
        txn.put(b"b", b"2".to_vec());
        txn.del(b"a");
        assert_eq!(txn.get(b"a").unwrap(), None);
        assert_eq!(txn.get(b"b").unwrap(), Some(b"2".to_vec()));
        txn.commit().unwrap();

        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn dispose_discards_writes() {
        let mut store = MemoryKv::new();
        let mut txn = store.begin_transaction();
        txn.put(b"a", b"1".to_vec());
        txn.dispose();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn drop_without_commit_discards_writes() {
        let mut store = MemoryKv::new();
        {
            let mut txn = store.begin_transaction();
            txn.put(b"a", b"1".to_vec());
        }
        assert_eq!(store.get(b"a").unwrap(), None);
    }
}
