//! Cryptographic primitives for the credential ledger.
//!
//! Provides domain-separated BLAKE3 hashing, Ed25519 signing behind the
//! [`Signer`] capability, and the binary Merkle tree used to commit to a
//! block's credential hashes.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod merkle;
pub mod signer;

pub use hasher::ContentHasher;
pub use merkle::{generate_proof, verify_proof, MerkleError, MerkleProof, MerkleTree, Side};
pub use signer::{
    Address, KeyPairSigner, Signature, SignatureError, Signer, SignerError, SigningKey,
    VerifyingKey, SIGNATURE_LEN,
};
