//! # redb-backed Record Storage
//!
//! A disk-backed `Persistence` using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! All records live in one table keyed by the rendered `StoreKey`.
//! `save_batch` writes every record in a single transaction, so a flush
//! either lands completely or not at all.

use super::{Persistence, StoreKey};
use crate::types::BrainError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};

/// Table for records: rendered key -> framed record bytes
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> BrainError {
    BrainError::StorageError(e.to_string())
}

impl RedbStore {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BrainError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let db = Database::create(&path).map_err(io_err)?;

        // Create the table up front so readers never see it missing.
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(RECORDS).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        Ok(Self { db, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for RedbStore {
    fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, BrainError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(RECORDS).map_err(io_err)?;
        let name = key.to_string();
        Ok(table
            .get(name.as_str())
            .map_err(io_err)?
            .map(|data| data.value().to_vec()))
    }

    fn save(&mut self, key: &StoreKey, value: &[u8]) -> Result<(), BrainError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(io_err)?;
            let name = key.to_string();
            table.insert(name.as_str(), value).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn save_batch(&mut self, records: &[(StoreKey, Vec<u8>)]) -> Result<(), BrainError> {
        if records.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(io_err)?;
            for (key, value) in records {
                let name = key.to_string();
                table.insert(name.as_str(), value.as_slice()).map_err(io_err)?;
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn remove(&mut self, key: &StoreKey) -> Result<bool, BrainError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let existed = {
            let mut table = write_txn.open_table(RECORDS).map_err(io_err)?;
            let name = key.to_string();
            let removed = table.remove(name.as_str()).map_err(io_err)?;
            removed.is_some()
        };
        write_txn.commit().map_err(io_err)?;
        Ok(existed)
    }

    fn remove_batch(&mut self, keys: &[StoreKey]) -> Result<usize, BrainError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let write_txn = self.db.begin_write().map_err(io_err)?;
        let mut removed = 0;
        {
            let mut table = write_txn.open_table(RECORDS).map_err(io_err)?;
            for key in keys {
                let name = key.to_string();
                if table.remove(name.as_str()).map_err(io_err)?.is_some() {
                    removed += 1;
                }
            }
        }
        write_txn.commit().map_err(io_err)?;
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<StoreKey>, BrainError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(RECORDS).map_err(io_err)?;

        let mut keys = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            keys.push(key.value().parse()?);
        }
        keys.sort();
        Ok(keys)
    }
}
