// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! Transactional local persistence backed by RocksDB: one column family
//! holds the `SyncStatus` singleton, the other holds `BlacklistEntry`
//! hashes. RocksDB calls are blocking, so every operation runs on
//! `tokio::task::spawn_blocking` to keep disk I/O off the async
//! executor.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{IteratorMode, WriteBatch};

use crate::error::{Result, SyncError};
use crate::model::SyncStatus;

/// Transaction-size cap for paged bulk operations.
pub const PAGE: usize = 1000;

const CF_STATUS: &str = "sync_status";
const CF_BLACKLIST: &str = "blacklist_entries";
const STATUS_KEY: &[u8] = b"singleton";

/// Atomic, per-call access to the `SyncStatus` singleton and the
/// `BlacklistEntry` set.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn load_or_init_status(&self) -> Result<SyncStatus>;
    async fn update_status(&self, status: &SyncStatus) -> Result<()>;
    async fn contains_hashed_ucvi(&self, hashed: &str) -> Result<bool>;
    async fn bulk_insert_missing(&self, hashes: &[String]) -> Result<()>;
    async fn bulk_delete(&self, hashes: &[String]) -> Result<()>;
    /// Deletes every existing entry and inserts `hashes`, atomically
    /// (single `WriteBatch`). Used for the first chunk of a
    /// non-incremental delivery so a concurrent reader never observes
    /// an empty mirror between the wipe and the insert.
    async fn reset_and_insert(&self, hashes: &[String]) -> Result<()>;
    async fn count_entries(&self) -> Result<u64>;
    /// Wipes the `BlacklistEntry` collection. Does not touch
    /// `SyncStatus`; callers update it separately in the same logical
    /// step.
    async fn drop_entries(&self) -> Result<()>;
}

/// RocksDB-backed [`LocalStore`].
pub struct RocksDbLocalStore {
    db: Arc<rocksdb::DB>,
}

impl RocksDbLocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| SyncError::Store(err.to_string()))?;
        }
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        let db = rocksdb::DB::open_cf(&opts, path, [CF_STATUS, CF_BLACKLIST])?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf_status(db: &rocksdb::DB) -> &rocksdb::ColumnFamily {
        db.cf_handle(CF_STATUS)
            .expect("sync_status column family must exist")
    }

    fn cf_blacklist(db: &rocksdb::DB) -> &rocksdb::ColumnFamily {
        db.cf_handle(CF_BLACKLIST)
            .expect("blacklist_entries column family must exist")
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("local store blocking task panicked")
}

#[async_trait]
impl LocalStore for RocksDbLocalStore {
    async fn load_or_init_status(&self) -> Result<SyncStatus> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let cf = Self::cf_status(&db);
            match db.get_cf(cf, STATUS_KEY)? {
                Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
                None => {
                    let status = SyncStatus::default();
                    db.put_cf(cf, STATUS_KEY, serde_json::to_vec(&status)?)?;
                    Ok(status)
                }
            }
        })
        .await
    }

    async fn update_status(&self, status: &SyncStatus) -> Result<()> {
        let db = Arc::clone(&self.db);
        let bytes = serde_json::to_vec(status)?;
        run_blocking(move || {
            let cf = Self::cf_status(&db);
            db.put_cf(cf, STATUS_KEY, bytes)?;
            Ok(())
        })
        .await
    }

    async fn contains_hashed_ucvi(&self, hashed: &str) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let hashed = hashed.to_owned();
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            Ok(db.get_cf(cf, hashed.as_bytes())?.is_some())
        })
        .await
    }

    async fn bulk_insert_missing(&self, hashes: &[String]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let hashes = hashes.to_vec();
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            let mut overlap: u64 = 0;
            for page in hashes.chunks(PAGE) {
                let mut batch = WriteBatch::default();
                for hash in page {
                    if db.get_cf(cf, hash.as_bytes())?.is_some() {
                        overlap += 1;
                        continue;
                    }
                    batch.put_cf(cf, hash.as_bytes(), b"1");
                }
                db.write(batch)?;
            }
            if overlap > 0 {
                tracing::warn!(
                    overlap,
                    "bulk insert skipped hashes already present in the local mirror"
                );
            }
            Ok(())
        })
        .await
    }

    async fn bulk_delete(&self, hashes: &[String]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let hashes = hashes.to_vec();
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            for page in hashes.chunks(PAGE) {
                let mut batch = WriteBatch::default();
                for hash in page {
                    batch.delete_cf(cf, hash.as_bytes());
                }
                db.write(batch)?;
            }
            Ok(())
        })
        .await
    }

    async fn reset_and_insert(&self, hashes: &[String]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let hashes = hashes.to_vec();
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            let existing: Vec<Box<[u8]>> = db
                .iterator_cf(cf, IteratorMode::Start)
                .map(|item| item.map(|(key, _)| key))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let mut batch = WriteBatch::default();
            for key in &existing {
                batch.delete_cf(cf, key);
            }
            for hash in &hashes {
                batch.put_cf(cf, hash.as_bytes(), b"1");
            }
            db.write(batch)?;
            Ok(())
        })
        .await
    }

    async fn count_entries(&self) -> Result<u64> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            let mut count: u64 = 0;
            for item in db.iterator_cf(cf, IteratorMode::Start) {
                item?;
                count += 1;
            }
            Ok(count)
        })
        .await
    }

    async fn drop_entries(&self) -> Result<()> {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let cf = Self::cf_blacklist(&db);
            let existing: Vec<Box<[u8]>> = db
                .iterator_cf(cf, IteratorMode::Start)
                .map(|item| item.map(|(key, _)| key))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for page in existing.chunks(PAGE) {
                let mut batch = WriteBatch::default();
                for key in page {
                    batch.delete_cf(cf, key);
                }
                db.write(batch)?;
            }
            Ok(())
        })
        .await
    }
}
