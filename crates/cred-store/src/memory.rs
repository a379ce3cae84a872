use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BatchOp, KvStore, WriteBatch};

/// In-memory, HashMap-based store.
///
/// Intended for tests and embedding. A batch is applied under a single write
/// lock, so readers see it all at once.
pub struct InMemoryKvStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let map = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        apply_batch(&mut map, batch);
        Ok(())
    }

    fn reset(&self) -> StoreResult<()> {
        self.entries
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

pub(crate) fn apply_batch(map: &mut HashMap<Vec<u8>, Vec<u8>>, batch: WriteBatch) {
    for op in batch.into_ops() {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

impl std::fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryKvStore")
            .field("key_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let store = InMemoryKvStore::new();
        store.put(b"key", b"value").unwrap();
        assert_eq!(store.get(b"key").unwrap(), Some(b"value".to_vec()));
        assert!(store.contains(b"key").unwrap());
    }

    #[test]
    fn missing_key_is_none() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get(b"nope").unwrap(), None);
        assert!(!store.contains(b"nope").unwrap());
    }

    #[test]
    fn put_overwrites() {
        let store = InMemoryKvStore::new();
        store.put(b"tip", b"one").unwrap();
        store.put(b"tip", b"two").unwrap();
        assert_eq!(store.get(b"tip").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn batch_applies_in_order() {
        let store = InMemoryKvStore::new();
        let mut batch = WriteBatch::new();
        batch
            .put(b"a".to_vec(), b"1".to_vec())
            .put(b"b".to_vec(), b"2".to_vec())
            .delete(b"a".to_vec());
        store.write(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), None);
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn delete_removes_key() {
        let store = InMemoryKvStore::new();
        store.put(b"k", b"v").unwrap();
        store.delete(b"k").unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn reset_clears_everything() {
        let store = InMemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.reset().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn debug_shows_count() {
        let store = InMemoryKvStore::new();
        store.put(b"a", b"1").unwrap();
        assert!(format!("{store:?}").contains("key_count: 1"));
    }
}
