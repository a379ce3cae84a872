use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Ordered set of mutations committed atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Byte-keyed store backing the chain.
///
/// All implementations must satisfy these invariants:
/// - A committed [`WriteBatch`] is applied entirely or not at all.
/// - Readers never observe a half-applied batch.
/// - Writes are serialized; reads may run concurrently.
/// - All I/O errors are propagated, never silently ignored.
pub trait KvStore: Send + Sync {
    /// Point read. Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Commit a batch durably and atomically.
    fn write(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Drop every key. Used to recover from an unusable store.
    fn reset(&self) -> StoreResult<()>;

    /// Point write.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Point delete.
    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        (**self).write(batch)
    }

    fn reset(&self) -> StoreResult<()> {
        (**self).reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_insertion_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec()).delete(b"b".to_vec());
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.ops()[0],
            BatchOp::Put {
                key: b"a".to_vec(),
                value: b"1".to_vec()
            }
        );
        assert_eq!(batch.ops()[1], BatchOp::Delete { key: b"b".to_vec() });
    }

    #[test]
    fn empty_batch() {
        assert!(WriteBatch::new().is_empty());
    }
}
