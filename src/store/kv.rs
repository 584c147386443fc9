use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info};

use super::wal::{Wal, WalRecord};
use super::{Entry, Store, StoreError, Transaction};

/// Keys per compacted batch, keeping each record well under the WAL's
/// record size cap.
const COMPACT_BATCH_KEYS: usize = 10_000;

/// A committed value and the commit sequence number that wrote it.
#[derive(Debug, Clone)]
struct Versioned {
    value: Vec<u8>,
    seq: u64,
}

struct State {
    entries: BTreeMap<Vec<u8>, Versioned>,
    /// Sequence number of the latest commit (or clear).
    seq: u64,
    /// Sequence number of the latest full clear.
    cleared_at: u64,
    wal: Option<Wal>,
    /// Set once a WAL write fails; the on-disk log can no longer be trusted
    /// to match memory, so every later commit is refused.
    failed: bool,
}

/// In-memory ordered key-value store with optimistic transactions, made
/// durable by an optional write-ahead log.
///
/// Commits validate under one write lock: a transaction loses if, after its
/// snapshot, the store was cleared, any key under a prefix it scanned was
/// written, or any key it writes was written by someone else.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<RwLock<State>>,
}

impl KvStore {
    /// Volatile store, for tests and throwaway runs.
    pub fn in_memory() -> Self {
        Self::from_state(State {
            entries: BTreeMap::new(),
            seq: 0,
            cleared_at: 0,
            wal: None,
            failed: false,
        })
    }

    /// Open (or create) a durable store backed by the WAL at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (wal, records) = Wal::recover(path)?;
        let mut entries = BTreeMap::new();
        let mut seq = 0u64;
        let mut cleared_at = 0u64;
        for record in &records {
            seq += 1;
            match record {
                WalRecord::Batch { writes } => {
                    for (key, value) in writes {
                        entries.insert(
                            key.clone(),
                            Versioned {
                                value: value.clone(),
                                seq,
                            },
                        );
                    }
                }
                WalRecord::Clear => {
                    entries.clear();
                    cleared_at = seq;
                }
            }
        }
        info!(
            path = %path.display(),
            records = records.len(),
            keys = entries.len(),
            "store opened"
        );
        Ok(Self::from_state(State {
            entries,
            seq,
            cleared_at,
            wal: Some(wal),
            failed: false,
        }))
    }

    fn from_state(state: State) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// WAL appends since the last compaction; 0 for an in-memory store.
    pub fn appends_since_compact(&self) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .wal
            .as_ref()
            .map_or(0, |w| w.appends_since_compact()))
    }

    /// Rewrite the WAL as batches holding the live entries.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.failed {
            return Err(StoreError::Unavailable("WAL previously failed".into()));
        }
        if state.wal.is_none() {
            return Ok(());
        }
        let writes: Vec<Entry> = state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        let keys = writes.len();
        let records: Vec<WalRecord> = writes
            .chunks(COMPACT_BATCH_KEYS)
            .map(|chunk| WalRecord::Batch {
                writes: chunk.to_vec(),
            })
            .collect();
        let State { wal, failed, .. } = &mut *state;
        let Some(wal) = wal.as_mut() else {
            return Ok(());
        };
        if let Err(e) = wal.compact(&records) {
            if wal.is_detached() {
                error!(path = %wal.path().display(), "WAL replaced but not reopened, refusing further writes: {e}");
                *failed = true;
            }
            return Err(StoreError::Io(e));
        }
        info!(keys, path = %wal.path().display(), "WAL compacted");
        Ok(())
    }

    /// Append to the WAL (if any) and fence the store on failure.
    fn persist(state: &mut State, record: &WalRecord) -> Result<(), StoreError> {
        if state.failed {
            return Err(StoreError::Unavailable("WAL previously failed".into()));
        }
        if let Some(wal) = state.wal.as_mut()
            && let Err(e) = wal.append(record)
        {
            error!("WAL append failed, refusing further writes: {e}");
            state.failed = true;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

impl Store for KvStore {
    type Txn = KvTransaction;

    fn begin(&self) -> Result<KvTransaction, StoreError> {
        let snapshot = self.read()?.seq;
        Ok(KvTransaction {
            store: self.clone(),
            snapshot,
            scanned: Vec::new(),
            writes: BTreeMap::new(),
        })
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.write()?;
        Self::persist(&mut state, &WalRecord::Clear)?;
        let removed = state.entries.len();
        state.entries.clear();
        state.seq += 1;
        state.cleared_at = state.seq;
        info!(removed, "store cleared");
        Ok(())
    }
}

/// Optimistic transaction over a [`KvStore`] snapshot.
pub struct KvTransaction {
    store: KvStore,
    snapshot: u64,
    scanned: Vec<Vec<u8>>,
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
}

fn prefix_range<'a, V>(
    map: &'a BTreeMap<Vec<u8>, V>,
    prefix: &'a [u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a V)> + 'a {
    map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(move |(k, _)| k.starts_with(prefix))
}

impl Transaction for KvTransaction {
    fn scan_prefix(&mut self, prefix: &[u8]) -> Result<Vec<Entry>, StoreError> {
        let state = self.store.read()?;
        if state.cleared_at > self.snapshot {
            // Our snapshot's data is gone; commit would fail anyway.
            return Err(StoreError::Conflict);
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = prefix_range(&state.entries, prefix)
            .filter(|(_, v)| v.seq <= self.snapshot)
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        drop(state);
        for (k, v) in prefix_range(&self.writes, prefix) {
            merged.insert(k.clone(), v.clone());
        }
        self.scanned.push(prefix.to_vec());
        Ok(merged.into_iter().collect())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, value);
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        let mut state = self.store.write()?;

        let conflict = state.cleared_at > self.snapshot
            || self.scanned.iter().any(|prefix| {
                prefix_range(&state.entries, prefix).any(|(_, v)| v.seq > self.snapshot)
            })
            || self
                .writes
                .keys()
                .any(|k| state.entries.get(k).is_some_and(|v| v.seq > self.snapshot));
        if conflict {
            debug!(snapshot = self.snapshot, head = state.seq, "commit rejected");
            metrics::counter!(crate::observability::STORE_CONFLICTS_TOTAL).increment(1);
            return Err(StoreError::Conflict);
        }

        let writes: Vec<Entry> = self.writes.into_iter().collect();
        let record = WalRecord::Batch { writes };
        KvStore::persist(&mut state, &record)?;

        state.seq += 1;
        let seq = state.seq;
        if let WalRecord::Batch { writes } = record {
            for (key, value) in writes {
                state.entries.insert(key, Versioned { value, seq });
            }
        }
        Ok(())
    }
}
