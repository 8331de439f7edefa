//! Errors for `execore-kv`.

/// A [`Result`] type alias where the error is [`KvError`].
pub type KvResult<T> = Result<T, KvError>;

/// An error type for [`crate::KvStore`] operations.
#[derive(thiserror::Error, Debug)]
pub enum KvError {
    /// The underlying RocksDB instance returned an error.
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    /// A transaction was committed or disposed twice.
    #[error("transaction already closed")]
    AlreadyClosed,
}
