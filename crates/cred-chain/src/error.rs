use std::path::PathBuf;

use cred_crypto::{Address, MerkleError, SignerError};
use cred_store::StoreError;
use cred_types::{Digest, TypeError};

/// Coarse classification shared by every ledger error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed data: bad digests, impossible timestamps, undecodable blocks.
    Structural,
    /// Hashes or heights that do not link up.
    Linkage,
    /// Signer is not on the allow-list.
    Authorization,
    /// Signing failed or a stored signature does not verify.
    Signature,
    /// I/O, missing keys, lock poisoning.
    Storage,
}

/// Errors from building or checking a single block.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("invalid block hash: expected {expected}, got {actual}")]
    HashMismatch { expected: Digest, actual: Digest },

    #[error("block timestamp is too far in the future: {timestamp} > {limit}")]
    TimestampInFuture { timestamp: i64, limit: i64 },

    #[error("invalid credential hash at index {index}: {source}")]
    MalformedCredentialHash { index: usize, source: TypeError },

    #[error("merkle root does not commit to the credential hashes: expected {expected}, got {actual}")]
    MerkleRootMismatch { expected: Digest, actual: Digest },

    #[error("signer {address} is not an authorized authority")]
    Unauthorized { address: Address },

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("merkle commitment failed: {0}")]
    Merkle(#[from] MerkleError),

    #[error("block encoding failed: {0}")]
    Encoding(String),
}

impl BlockError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::HashMismatch { .. } => ErrorClass::Linkage,
            Self::TimestampInFuture { .. }
            | Self::MalformedCredentialHash { .. }
            | Self::MerkleRootMismatch { .. }
            | Self::Merkle(_)
            | Self::Encoding(_) => ErrorClass::Structural,
            Self::Unauthorized { .. } => ErrorClass::Authorization,
            Self::Signing(_) => ErrorClass::Signature,
        }
    }
}

/// Errors from loading the authority allow-list.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("cannot read allow-list: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed allow-list: {0}")]
    Parse(String),

    #[error("invalid public key for authority {name}")]
    InvalidKey { name: String },
}

impl AuthorityError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io(_) => ErrorClass::Storage,
            Self::Parse(_) | Self::InvalidKey { .. } => ErrorClass::Structural,
        }
    }
}

/// Errors from chain operations.
///
/// Validation failures carry the block index (oldest first, so it equals the
/// expected height) together with the expected and actual values.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("chain is empty")]
    Empty,

    #[error("no chain found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("block {index} validation failed: {source}")]
    InvalidBlock { index: u64, source: BlockError },

    #[error("block {index} signature does not verify against its signer")]
    BadSignature { index: u64 },

    #[error("first block must be genesis block with height 0, got {height}")]
    GenesisHeight { height: u64 },

    #[error("block {index} has incorrect height: expected {expected}, got {actual}")]
    HeightMismatch { index: u64, expected: u64, actual: u64 },

    #[error("block {index} has incorrect prev_hash: expected {expected}, got {actual}")]
    PrevHashMismatch {
        index: u64,
        expected: Digest,
        actual: String,
    },

    #[error("block {index} timestamp ({timestamp}) is before previous block timestamp ({previous})")]
    TimestampRegression {
        index: u64,
        timestamp: i64,
        previous: i64,
    },

    #[error("tip mismatch: expected {expected}, stored tip is {actual}")]
    TipMismatch { expected: Digest, actual: String },

    #[error("block {0} not found in store")]
    MissingBlock(Digest),

    #[error("block {hash} is corrupt: {reason}")]
    CorruptBlock { hash: Digest, reason: String },

    #[error("stored tip pointer is malformed: {0}")]
    CorruptTip(String),

    #[error("prev_hash links loop back to block {0}")]
    Cycle(Digest),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("chain lock poisoned")]
    LockPoisoned,
}

impl ChainError {
    /// Position of the offending block, when the error concerns one.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::InvalidBlock { index, .. }
            | Self::BadSignature { index }
            | Self::HeightMismatch { index, .. }
            | Self::PrevHashMismatch { index, .. }
            | Self::TimestampRegression { index, .. } => Some(*index),
            Self::GenesisHeight { .. } => Some(0),
            _ => None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidBlock { source, .. } => source.class(),
            Self::Block(source) => source.class(),
            Self::BadSignature { .. } => ErrorClass::Signature,
            Self::HeightMismatch { .. }
            | Self::PrevHashMismatch { .. }
            | Self::TimestampRegression { .. }
            | Self::TipMismatch { .. }
            | Self::Cycle(_) => ErrorClass::Linkage,
            Self::GenesisHeight { .. } | Self::CorruptBlock { .. } | Self::CorruptTip(_) => {
                ErrorClass::Structural
            }
            Self::Empty
            | Self::NotFound(_)
            | Self::MissingBlock(_)
            | Self::Store(_)
            | Self::LockPoisoned => ErrorClass::Storage,
        }
    }

    /// Whether `initialize` may discard the store and start over.
    pub(crate) fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::MissingBlock(_) | Self::CorruptBlock { .. } | Self::CorruptTip(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_report_index() {
        let err = ChainError::HeightMismatch {
            index: 3,
            expected: 3,
            actual: 4,
        };
        assert_eq!(err.index(), Some(3));
        assert_eq!(err.class(), ErrorClass::Linkage);
        assert_eq!(
            err.to_string(),
            "block 3 has incorrect height: expected 3, got 4"
        );
    }

    #[test]
    fn invalid_block_inherits_class() {
        let err = ChainError::InvalidBlock {
            index: 2,
            source: BlockError::MalformedCredentialHash {
                index: 0,
                source: TypeError::InvalidHex("bad".into()),
            },
        };
        assert_eq!(err.class(), ErrorClass::Structural);
        assert_eq!(err.index(), Some(2));
    }

    #[test]
    fn storage_errors_have_no_index() {
        let err = ChainError::MissingBlock(Digest::null());
        assert_eq!(err.index(), None);
        assert_eq!(err.class(), ErrorClass::Storage);
        assert!(err.is_corruption());
        assert!(!ChainError::Empty.is_corruption());
    }

    #[test]
    fn block_error_classes() {
        assert_eq!(
            BlockError::HashMismatch {
                expected: Digest::null(),
                actual: Digest::null()
            }
            .class(),
            ErrorClass::Linkage
        );
        assert_eq!(
            BlockError::Signing(SignerError::Unavailable("hsm offline".into())).class(),
            ErrorClass::Signature
        );
        assert_eq!(
            BlockError::Encoding("eof".into()).class(),
            ErrorClass::Structural
        );
    }
}
