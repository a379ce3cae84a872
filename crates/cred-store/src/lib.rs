//! Block storage for the credential ledger.
//!
//! The chain sees storage as a byte-keyed map with point reads and atomic
//! write batches. Blocks are stored under their own hash and one reserved
//! key holds the tip, so a batch is how a new block and the advanced tip
//! become visible together.
//!
//! # Storage Backends
//!
//! All backends implement the [`KvStore`] trait:
//!
//! - [`InMemoryKvStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileKvStore`] -- append-only, CRC-framed log replayed on open
//!
//! # Design Rules
//!
//! 1. A batch is applied entirely or not at all.
//! 2. Write-then-publish: a batch is durable before readers can see it.
//! 3. One writer at a time; concurrent reads are always safe.
//! 4. The store never interprets values.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileKvStore, FileStoreConfig, SyncMode, LOG_FILE};
pub use memory::InMemoryKvStore;
pub use traits::{BatchOp, KvStore, WriteBatch};
