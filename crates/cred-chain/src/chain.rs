use std::collections::HashSet;
use std::iter::FusedIterator;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use cred_crypto::{MerkleProof, Signer};
use cred_store::{FileKvStore, FileStoreConfig, KvStore, StoreError, WriteBatch, LOG_FILE};
use cred_types::{time, Digest};
use tracing::{debug, info, warn};

use crate::authority::AuthorityRegistry;
use crate::block::Block;
use crate::error::{BlockError, ChainError};

/// Reserved store key holding the hash of the newest block.
pub const TIP_KEY: &[u8] = b"tip";

/// Aggregate counts from one full traversal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChainStats {
    pub block_count: u64,
    pub credential_count: u64,
}

/// Hash-linked chain of authority-signed blocks.
///
/// Blocks are stored under their own hash and never rewritten; the only
/// mutable state is the tip. Appends are serialized by an internal mutex and
/// commit the new block together with the advanced tip in one batch, so
/// readers never observe a tip whose block is missing.
pub struct Chain<S: KvStore> {
    store: S,
    registry: AuthorityRegistry,
    tip: RwLock<Digest>,
    append_lock: Mutex<()>,
}

impl Chain<FileKvStore> {
    /// Open the chain in `dir`, creating it with a genesis block if needed.
    ///
    /// A store log that fails its integrity check is removed and the chain
    /// is recreated from a fresh genesis. Only an authorized signer may do
    /// this; anyone else gets `Unauthorized` and the log is left in place.
    pub fn initialize(
        dir: &Path,
        config: FileStoreConfig,
        registry: AuthorityRegistry,
        signer: &dyn Signer,
    ) -> Result<Self, ChainError> {
        let store = match FileKvStore::open(dir, config.clone()) {
            Ok(store) => store,
            Err(StoreError::Corrupt { offset, reason }) => {
                if !registry.is_authorized(&signer.public_key()) {
                    return Err(BlockError::Unauthorized {
                        address: signer.address(),
                    }
                    .into());
                }
                warn!(
                    path = %dir.display(),
                    offset,
                    %reason,
                    "store log is corrupt, recreating chain"
                );
                std::fs::remove_file(dir.join(LOG_FILE)).map_err(StoreError::from)?;
                FileKvStore::open(dir, config)?
            }
            Err(e) => return Err(e.into()),
        };
        Self::initialize_in(store, registry, signer)
    }

    /// Open an existing chain in `dir`.
    pub fn open(
        dir: &Path,
        config: FileStoreConfig,
        registry: AuthorityRegistry,
    ) -> Result<Self, ChainError> {
        if !FileKvStore::exists(dir) {
            return Err(ChainError::NotFound(dir.to_path_buf()));
        }
        let store = FileKvStore::open(dir, config)?;
        match Self::open_in(store, registry) {
            Err(ChainError::Empty) => Err(ChainError::NotFound(dir.to_path_buf())),
            other => other,
        }
    }
}

impl<S: KvStore> Chain<S> {
    /// Load the chain held by `store`, or start one with a genesis block.
    ///
    /// A store whose tip points at a missing or undecodable block is reset
    /// before the new genesis is written.
    pub fn initialize_in(
        store: S,
        registry: AuthorityRegistry,
        signer: &dyn Signer,
    ) -> Result<Self, ChainError> {
        let needs_reset = match load_tip(&store) {
            Ok(Some(tip)) => {
                info!(height = tip.height, tip = %tip.hash.short_hex(), "loaded existing chain");
                return Ok(Self::from_parts(store, registry, tip.hash));
            }
            Ok(None) => false,
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "stored chain is unreadable, starting over");
                true
            }
            Err(e) => return Err(e),
        };

        let genesis = Block::genesis(signer, &registry)?;
        if needs_reset {
            store.reset()?;
        }

        let mut batch = WriteBatch::new();
        batch
            .put(genesis.hash.as_bytes().to_vec(), genesis.to_bytes()?)
            .put(TIP_KEY.to_vec(), genesis.hash.as_bytes().to_vec());
        store.write(batch)?;

        info!(genesis = %genesis.hash.short_hex(), "created new chain");
        Ok(Self::from_parts(store, registry, genesis.hash))
    }

    /// Load the chain held by `store`. Fails with `Empty` if there is none.
    pub fn open_in(store: S, registry: AuthorityRegistry) -> Result<Self, ChainError> {
        let tip = load_tip(&store)?.ok_or(ChainError::Empty)?;
        info!(height = tip.height, tip = %tip.hash.short_hex(), "opened chain");
        Ok(Self::from_parts(store, registry, tip.hash))
    }

    fn from_parts(store: S, registry: AuthorityRegistry, tip: Digest) -> Self {
        Self {
            store,
            registry,
            tip: RwLock::new(tip),
            append_lock: Mutex::new(()),
        }
    }

    /// Sign and persist a new block holding `credential_ids`.
    ///
    /// Nothing is written if the signer is not authorized or signing fails.
    pub fn append<T: AsRef<str>>(
        &self,
        credential_ids: &[T],
        signer: &dyn Signer,
    ) -> Result<Block, ChainError> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| ChainError::LockPoisoned)?;

        let tip = self.tip_block()?;
        let timestamp = time::unix_now().max(tip.timestamp);
        let block = Block::construct_at(
            credential_ids,
            Some(tip.hash),
            tip.height + 1,
            timestamp,
            signer,
            &self.registry,
        )?;

        let mut batch = WriteBatch::new();
        batch
            .put(block.hash.as_bytes().to_vec(), block.to_bytes()?)
            .put(TIP_KEY.to_vec(), block.hash.as_bytes().to_vec());
        self.store.write(batch)?;

        *self.tip.write().map_err(|_| ChainError::LockPoisoned)? = block.hash;

        debug!(
            height = block.height,
            hash = %block.hash.short_hex(),
            credentials = block.credential_count(),
            "appended block"
        );
        Ok(block)
    }

    /// Check every block from genesis to the stored tip.
    ///
    /// Reports the first violation found, oldest block first. Holds the
    /// append lock, so the stored tip and the in-memory tip must agree.
    pub fn validate(&self) -> Result<(), ChainError> {
        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| ChainError::LockPoisoned)?;
        let tip = read_tip(&self.store)?.ok_or(ChainError::Empty)?;
        let mut blocks = ChainIter::new(&self.store, tip).collect::<Result<Vec<_>, _>>()?;
        blocks.reverse();

        let now = time::unix_now();
        let Some(genesis) = blocks.first() else {
            return Err(ChainError::Empty);
        };
        if genesis.height != 0 {
            return Err(ChainError::GenesisHeight {
                height: genesis.height,
            });
        }
        check_block(genesis, 0, now)?;

        for (index, pair) in (1u64..).zip(blocks.windows(2)) {
            let (prev, block) = (&pair[0], &pair[1]);
            check_block(block, index, now)?;

            let expected_height = prev.height + 1;
            if block.height != expected_height {
                return Err(ChainError::HeightMismatch {
                    index,
                    expected: expected_height,
                    actual: block.height,
                });
            }
            if block.prev_hash != Some(prev.hash) {
                return Err(ChainError::PrevHashMismatch {
                    index,
                    expected: prev.hash,
                    actual: block
                        .prev_hash
                        .map_or_else(|| "none".to_string(), |h| h.to_hex()),
                });
            }
            if block.timestamp < prev.timestamp {
                return Err(ChainError::TimestampRegression {
                    index,
                    timestamp: block.timestamp,
                    previous: prev.timestamp,
                });
            }
        }

        if let Some(newest) = blocks.last() {
            if newest.hash != tip {
                return Err(ChainError::TipMismatch {
                    expected: newest.hash,
                    actual: tip.to_hex(),
                });
            }
        }
        let current = self.tip();
        if current != tip {
            return Err(ChainError::TipMismatch {
                expected: current,
                actual: tip.to_hex(),
            });
        }

        debug!(blocks = blocks.len(), "chain validated");
        Ok(())
    }

    /// Lazily walk the chain newest to oldest.
    pub fn iter(&self) -> ChainIter<'_, S> {
        ChainIter::new(&self.store, self.tip())
    }

    pub fn stats(&self) -> Result<ChainStats, ChainError> {
        self.iter().try_fold(ChainStats::default(), |mut stats, block| {
            let block = block?;
            stats.block_count += 1;
            stats.credential_count += block.credential_count() as u64;
            Ok(stats)
        })
    }

    /// Hash of the newest block.
    pub fn tip(&self) -> Digest {
        *self.tip.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn tip_block(&self) -> Result<Block, ChainError> {
        self.block(&self.tip())
    }

    pub fn block(&self, hash: &Digest) -> Result<Block, ChainError> {
        read_block(&self.store, hash)
    }

    pub fn height(&self) -> Result<u64, ChainError> {
        Ok(self.tip_block()?.height)
    }

    /// Newest block holding `credential_id`, with its inclusion proof.
    pub fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<(Block, MerkleProof)>, ChainError> {
        for block in self.iter() {
            let block = block?;
            if let Some(proof) = block.prove_membership(credential_id) {
                return Ok(Some((block, proof)));
            }
        }
        Ok(None)
    }

    pub fn registry(&self) -> &AuthorityRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: KvStore> std::fmt::Debug for Chain<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("tip", &self.tip())
            .field("authorities", &self.registry.len())
            .finish()
    }
}

/// Iterator over blocks from a starting hash back to genesis.
///
/// Stops after genesis or after the first error. A `prev_hash` that leads
/// back to an already-visited block yields `ChainError::Cycle`.
pub struct ChainIter<'a, S: KvStore> {
    store: &'a S,
    next: Option<Digest>,
    seen: HashSet<Digest>,
}

impl<'a, S: KvStore> ChainIter<'a, S> {
    fn new(store: &'a S, start: Digest) -> Self {
        Self {
            store,
            next: Some(start),
            seen: HashSet::new(),
        }
    }
}

impl<S: KvStore> Iterator for ChainIter<'_, S> {
    type Item = Result<Block, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.next.take()?;
        if !self.seen.insert(hash) {
            return Some(Err(ChainError::Cycle(hash)));
        }
        match read_block(self.store, &hash) {
            Ok(block) => {
                self.next = block.prev_hash;
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<S: KvStore> FusedIterator for ChainIter<'_, S> {}

fn check_block(block: &Block, index: u64, now: i64) -> Result<(), ChainError> {
    block
        .validate_self_at(now)
        .map_err(|source| ChainError::InvalidBlock { index, source })?;
    if !block.verify_own_signature() {
        return Err(ChainError::BadSignature { index });
    }
    Ok(())
}

fn read_tip<S: KvStore>(store: &S) -> Result<Option<Digest>, ChainError> {
    let Some(raw) = store.get(TIP_KEY)? else {
        return Ok(None);
    };
    Digest::from_slice(&raw)
        .map(Some)
        .map_err(|e| ChainError::CorruptTip(e.to_string()))
}

fn load_tip<S: KvStore>(store: &S) -> Result<Option<Block>, ChainError> {
    match read_tip(store)? {
        Some(hash) => read_block(store, &hash).map(Some),
        None => Ok(None),
    }
}

fn read_block<S: KvStore>(store: &S, hash: &Digest) -> Result<Block, ChainError> {
    let bytes = store
        .get(hash.as_bytes())?
        .ok_or(ChainError::MissingBlock(*hash))?;
    Block::from_bytes(&bytes).map_err(|e| ChainError::CorruptBlock {
        hash: *hash,
        reason: e.to_string(),
    })
}
