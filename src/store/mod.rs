mod kv;
mod wal;

pub use kv::{KvStore, KvTransaction};
pub use wal::{Wal, WalRecord};

use std::io;

pub type Entry = (Vec<u8>, Vec<u8>);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lost an optimistic-concurrency race; the transaction wrote nothing.
    #[error("transaction conflict: concurrent commit touched the same keys")]
    Conflict,
    #[error("store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Ordered, durable key-value store with transactional read-then-write.
pub trait Store: Send + Sync {
    type Txn: Transaction;

    /// Open a transaction on the current committed snapshot.
    fn begin(&self) -> Result<Self::Txn, StoreError>;

    /// Unconditionally remove every key.
    fn clear(&self) -> Result<(), StoreError>;
}

/// A unit of work. Dropping without `commit` aborts it.
pub trait Transaction {
    /// All entries whose key starts with `prefix`, in key order. The
    /// transaction's own pending writes are included.
    fn scan_prefix(&mut self, prefix: &[u8]) -> Result<Vec<Entry>, StoreError>;

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>);

    /// Atomically apply all writes, or fail with `StoreError::Conflict` if a
    /// concurrent commit invalidated anything this transaction read or wrote.
    fn commit(self) -> Result<(), StoreError>;
}
