use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::memory::apply_batch;
use crate::traits::{KvStore, WriteBatch};

/// Name of the log file inside a store directory.
pub const LOG_FILE: &str = "ledger.log";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// Flush/sync strategy for committed batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every batch (safest, highest latency).
    #[default]
    EveryWrite,
    /// Flush to the OS and rely on page-cache buffering.
    OsDefault,
}

#[derive(Clone, Debug, Default)]
pub struct FileStoreConfig {
    pub sync_mode: SyncMode,
}

struct LogWriter {
    writer: BufWriter<File>,
    /// Current end of the log in bytes.
    offset: u64,
}

/// Durable store backed by an append-only log file.
///
/// Every committed [`WriteBatch`] becomes one record:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized WriteBatch)]
/// ```
///
/// On open the log is replayed front-to-back into an in-memory index. A
/// record cut short at the end of the file is a torn write from a crash and
/// is truncated away; a complete record that fails its CRC or cannot be
/// decoded makes the whole store [`StoreError::Corrupt`].
pub struct FileKvStore {
    path: PathBuf,
    index: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    writer: Mutex<LogWriter>,
    config: FileStoreConfig,
}

impl FileKvStore {
    /// Open (or create) the store in `dir`.
    pub fn open(dir: &Path, config: FileStoreConfig) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let (index, valid_len) = replay(&mut file)?;
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn record at end of log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(&path)?;
        debug!(path = %path.display(), keys = index.len(), "opened file store");

        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset: valid_len,
            }),
            config,
        })
    }

    /// Whether `dir` already holds a store log.
    pub fn exists(dir: &Path) -> bool {
        dir.join(LOG_FILE).is_file()
    }

    /// Path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes.
    pub fn offset(&self) -> StoreResult<u64> {
        Ok(self.writer.lock().map_err(|_| StoreError::LockPoisoned)?.offset)
    }

    /// Drop anything a failed write left behind, buffered or on disk, so
    /// the next record starts at the end of the last committed one.
    fn rollback(&self, w: &mut LogWriter) -> StoreResult<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let failed = std::mem::replace(&mut w.writer, BufWriter::new(file));
        // Discard the buffer without flushing it.
        let _ = failed.into_parts();
        w.writer.get_ref().set_len(w.offset)?;
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let index = self.index.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(index.get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload =
            bincode::serialize(&batch).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("batch exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let record_offset = w.offset;

        if let Err(e) = append_record(&mut w, length, crc, &payload, self.config.sync_mode) {
            warn!(offset = record_offset, error = %e, "batch write failed, rolling back");
            self.rollback(&mut w)?;
            return Err(e.into());
        }
        w.offset += (HEADER_SIZE + payload.len()) as u64;

        // The record is durable before it becomes visible to readers.
        let ops = batch.len();
        let mut index = self.index.write().map_err(|_| StoreError::LockPoisoned)?;
        apply_batch(&mut index, batch);

        debug!(offset = record_offset, ops, len = payload.len(), "committed batch");
        Ok(())
    }

    fn reset(&self) -> StoreResult<()> {
        let mut w = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        drop(file);

        w.writer = BufWriter::new(OpenOptions::new().append(true).open(&self.path)?);
        w.offset = 0;
        self.index
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();

        warn!(path = %self.path.display(), "store reset");
        Ok(())
    }
}

impl std::fmt::Debug for FileKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKvStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}

fn append_record(
    w: &mut LogWriter,
    length: u32,
    crc: u32,
    payload: &[u8],
    sync_mode: SyncMode,
) -> std::io::Result<()> {
    w.writer.write_all(&length.to_le_bytes())?;
    w.writer.write_all(&crc.to_le_bytes())?;
    w.writer.write_all(payload)?;
    w.writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        w.writer.get_ref().sync_all()?;
    }
    Ok(())
}

/// Replay the log, returning the index and the length of the valid prefix.
fn replay(file: &mut File) -> StoreResult<(HashMap<Vec<u8>, Vec<u8>>, u64)> {
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;

    let mut index = HashMap::new();
    let mut offset = 0usize;

    while offset + HEADER_SIZE <= data.len() {
        let header = &data[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + HEADER_SIZE;
        let Some(end) = start.checked_add(length).filter(|end| *end <= data.len()) else {
            // Record runs past the end of the file: torn write.
            break;
        };

        let payload = &data[start..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Err(StoreError::Corrupt {
                offset: offset as u64,
                reason: format!("CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"),
            });
        }

        let batch: WriteBatch = bincode::deserialize(payload).map_err(|e| StoreError::Corrupt {
            offset: offset as u64,
            reason: format!("undecodable batch: {e}"),
        })?;
        apply_batch(&mut index, batch);

        offset = end;
    }

    Ok((index, offset as u64))
}
