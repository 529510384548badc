//! In-memory `Persistence` backend.
//!
//! Clones share the same records, so a test can keep a handle, hand another
//! to a `Brain`, and inspect or sabotage what gets written.

use super::{Persistence, StoreKey};
use crate::types::BrainError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<StoreKey, Vec<u8>>>>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save (and remove) fail with `StorageError`.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<StoreKey, Vec<u8>>>, BrainError> {
        self.records
            .lock()
            .map_err(|_| BrainError::StorageError("memory store lock poisoned".to_string()))
    }

    fn check_writable(&self) -> Result<(), BrainError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BrainError::StorageError(
                "memory store is read-only".to_string(),
            ));
        }
        Ok(())
    }
}

impl Persistence for MemoryStore {
    fn load(&self, key: &StoreKey) -> Result<Option<Vec<u8>>, BrainError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&mut self, key: &StoreKey, value: &[u8]) -> Result<(), BrainError> {
        self.check_writable()?;
        self.lock()?.insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn save_batch(&mut self, records: &[(StoreKey, Vec<u8>)]) -> Result<(), BrainError> {
        self.check_writable()?;
        let mut stored = self.lock()?;
        for (key, value) in records {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove(&mut self, key: &StoreKey) -> Result<bool, BrainError> {
        self.check_writable()?;
        Ok(self.lock()?.remove(key).is_some())
    }

    fn remove_batch(&mut self, keys: &[StoreKey]) -> Result<usize, BrainError> {
        self.check_writable()?;
        let mut stored = self.lock()?;
        Ok(keys.iter().filter(|key| stored.remove(*key).is_some()).count())
    }

    fn keys(&self) -> Result<Vec<StoreKey>, BrainError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_records() {
        let store = MemoryStore::new();
        let mut handle = store.clone();
        handle.save(&StoreKey::Head, b"abc").expect("save");
        assert_eq!(store.load(&StoreKey::Head).expect("load"), Some(b"abc".to_vec()));
        assert_eq!(store.keys().expect("keys"), vec![StoreKey::Head]);
    }

    #[test]
    fn failing_saves_surface_errors() {
        let mut store = MemoryStore::new();
        store.set_fail_saves(true);
        assert!(matches!(
            store.save(&StoreKey::Graph, b"x"),
            Err(BrainError::StorageError(_))
        ));
        assert!(store.is_empty());
        store.set_fail_saves(false);
        store.save(&StoreKey::Graph, b"x").expect("save");
        assert!(store.remove(&StoreKey::Graph).expect("remove"));
        assert!(!store.remove(&StoreKey::Graph).expect("remove"));
    }

    #[test]
    fn failing_batch_removal_keeps_every_record() {
        let mut store = MemoryStore::new();
        store.save(&StoreKey::Graph, b"g").expect("save");
        store.save(&StoreKey::Head, b"h").expect("save");
        let keys = [StoreKey::Graph, StoreKey::Head, StoreKey::Pending];

        store.set_fail_saves(true);
        assert!(store.remove_batch(&keys).is_err());
        assert_eq!(store.keys().expect("keys").len(), 2);

        store.set_fail_saves(false);
        assert_eq!(store.remove_batch(&keys).expect("remove"), 2);
        assert!(store.is_empty());
    }
}
