//! A [`KvStore`] backed by [rocksdb], for durable node/account/header storage.

use crate::{KvError, KvResult, KvStore};
use rocksdb::{Options, DB};
use std::path::{Path, PathBuf};

/// A durable, synchronous key-value store backed by RocksDB.
#[derive(Debug)]
pub struct RocksDbKv {
    data_directory: PathBuf,
    db: DB,
}

impl RocksDbKv {
    /// Opens (or creates) a [`RocksDbKv`] rooted at `data_directory`.
    pub fn open(data_directory: impl AsRef<Path>) -> KvResult<Self> {
        let data_directory = data_directory.as_ref().to_path_buf();
        let db = DB::open(&Self::options(), &data_directory)?;
        Ok(Self { data_directory, db })
    }

    fn options() -> Options {
        let mut options = Options::default();
        options.set_compression_type(rocksdb::DBCompressionType::Snappy);
        options.create_if_missing(true);
        options
    }
}

impl KvStore for RocksDbKv {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&mut self, key: &[u8], value: Vec<u8>) -> KvResult<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn del(&mut self, key: &[u8]) -> KvResult<()> {
        self.db.delete(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_del() {
        let dir = tempfile::tempdir().unwrap();
        let mut kv = RocksDbKv::open(dir.path()).unwrap();
        kv.put(b"k", b"v".to_vec()).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        kv.del(b"k").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
    }
}
