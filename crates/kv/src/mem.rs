//! An in-memory [`KvStore`](crate::KvStore), useful for tests and as the backing store for
//! ephemeral executions.

use crate::{KvResult, KvStore};
use std::collections::HashMap;

/// A simple, synchronous key-value store that stores data in memory.
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct MemoryKv {
    store: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKv {
    /// Creates a new, empty [`MemoryKv`].
    pub fn new() -> Self {
        Self { store: HashMap::new() }
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.store.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> KvResult<()> {
        self.store.insert(key.to_vec(), value);
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> KvResult<()> {
        self.store.remove(key);
        Ok(())
    }
}
