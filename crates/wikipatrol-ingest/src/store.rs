//! Durable record store with insert-only writes and duplicate detection.
//!
//! Records are JSON documents keyed by their composite identity
//! (`"<wiki>-<changeId>"`) in RocksDB. Insert is the sole write path and is
//! unconditional from the caller's perspective: the pipeline never checks
//! for existence first. Uniqueness is enforced inside this adapter by an
//! optimistic transaction - when concurrent duplicate inserts race, the
//! engine's conflict detection picks exactly one winner and the losers see
//! [`InsertOutcome::Duplicate`].
//!
//! Duplicate outcomes are expected under at-least-once delivery and are
//! treated as success by callers.

use crate::error::Result;
use rocksdb::{ErrorKind, MultiThreaded, OptimisticTransactionDB, Options};
use std::path::Path;
use wikipatrol_core::EnrichedChangeRecord;

/// Result of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was persisted; this call won the identity.
    Inserted,
    /// A record with this identity already exists (or won a concurrent
    /// race). The stored record is untouched.
    Duplicate,
}

/// RocksDB-backed store for enriched change records.
///
/// Thread-safe: share across tasks via `Arc<RecordStore>`. Concurrent
/// writers are safe; dedup is handled per insert, not by any global lock.
pub struct RecordStore {
    db: OptimisticTransactionDB<MultiThreaded>,
}

impl RecordStore {
    /// Open or create the store at the given path.
    ///
    /// Failure here is a fatal setup error; the process must not start
    /// without its store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening record store at {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);

        // Write-heavy workload: larger memtables, fewer small SSTs.
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_write_buffer_number(3);
        opts.set_target_file_size_base(64 * 1024 * 1024);

        // Bloom filters make duplicate probes cheap.
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_cache_index_and_filter_blocks(true);
        opts.set_block_based_table_factory(&block_opts);

        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.increase_parallelism(num_cpus::get() as i32);

        let db = OptimisticTransactionDB::<MultiThreaded>::open(&opts, path)?;

        Ok(Self { db })
    }

    /// Insert a record, enforcing identity uniqueness.
    ///
    /// Returns [`InsertOutcome::Duplicate`] when the identity already
    /// exists or when a concurrent insert of the same identity commits
    /// first. Any other storage failure is an error; the caller drops the
    /// event.
    pub fn insert(&self, record: &EnrichedChangeRecord) -> Result<InsertOutcome> {
        let key = record.id.as_bytes();
        let value = serde_json::to_vec(record)?;

        let txn = self.db.transaction();

        // The read is tracked by the transaction: if another writer commits
        // this key before we do, our commit fails validation.
        if txn.get_for_update(key, true)?.is_some() {
            return Ok(InsertOutcome::Duplicate);
        }

        txn.put(key, &value)?;

        match txn.commit() {
            Ok(()) => Ok(InsertOutcome::Inserted),
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                // Lost the race to a concurrent insert of the same identity.
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a record by identity.
    pub fn get(&self, id: &str) -> Result<Option<EnrichedChangeRecord>> {
        match self.db.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Approximate number of stored records.
    pub fn approximate_count(&self) -> Result<u64> {
        let count = self
            .db
            .property_int_value("rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(count)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Snapshot store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            approximate_records: self.approximate_count().unwrap_or(0),
        }
    }
}

/// Statistics about the record store.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Approximate number of records in the store.
    pub approximate_records: u64,
}
