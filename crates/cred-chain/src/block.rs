//! Authority-signed ledger blocks.
//!
//! A block commits to an ordered list of credential hashes through a Merkle
//! root, links to its predecessor by hash, and carries an Ed25519 signature
//! from an authorized signer. Construction signs first and hashes second:
//! the signature covers every field except `hash` and `signature`, and the
//! block hash covers every field including the signature.

use cred_crypto::{
    generate_proof, verify_proof, ContentHasher, MerkleProof, MerkleTree, Signature, Signer,
    VerifyingKey,
};
use cred_types::{time, CredentialHash, Digest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::authority::AuthorityRegistry;
use crate::error::BlockError;

/// One signed, immutable ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain; genesis is 0.
    pub height: u64,
    /// Unix seconds at construction.
    pub timestamp: i64,
    /// Hash of the predecessor; `None` only for genesis.
    pub prev_hash: Option<Digest>,
    /// Hex hashes of the credential identifiers, in insertion order.
    pub credential_hashes: Vec<CredentialHash>,
    /// Merkle root over the credential digests (null when there are none).
    pub merkle_root: Digest,
    /// Public identity of the producing authority.
    pub signer: VerifyingKey,
    /// `R || S` over the signing digest.
    pub signature: Vec<u8>,
    /// Digest over every field above, signature included.
    pub hash: Digest,
}

impl Block {
    /// Build and sign a block stamped with the current time.
    pub fn construct<S: AsRef<str>>(
        credential_ids: &[S],
        prev_hash: Option<Digest>,
        height: u64,
        signer: &dyn Signer,
        registry: &AuthorityRegistry,
    ) -> Result<Self, BlockError> {
        Self::construct_at(
            credential_ids,
            prev_hash,
            height,
            time::unix_now(),
            signer,
            registry,
        )
    }

    /// Build and sign a block with an explicit timestamp.
    ///
    /// The signer must be on the allow-list; otherwise nothing is signed and
    /// `BlockError::Unauthorized` is returned.
    pub fn construct_at<S: AsRef<str>>(
        credential_ids: &[S],
        prev_hash: Option<Digest>,
        height: u64,
        timestamp: i64,
        signer: &dyn Signer,
        registry: &AuthorityRegistry,
    ) -> Result<Self, BlockError> {
        let public_key = signer.public_key();
        if !registry.is_authorized(&public_key) {
            return Err(BlockError::Unauthorized {
                address: public_key.address(),
            });
        }

        let digests: Vec<Digest> = credential_ids
            .iter()
            .map(|id| Digest::of(id.as_ref().as_bytes()))
            .collect();
        let merkle_root = merkle_root_of(&digests)?;

        let mut block = Self {
            height,
            timestamp,
            prev_hash,
            credential_hashes: digests.iter().map(CredentialHash::from_digest).collect(),
            merkle_root,
            signer: public_key,
            signature: Vec::new(),
            hash: Digest::null(),
        };

        let signature = signer.sign(block.signing_digest().as_bytes())?;
        block.signature = signature.to_bytes().to_vec();
        block.hash = block.compute_hash();

        debug!(
            height,
            hash = %block.hash.short_hex(),
            credentials = block.credential_hashes.len(),
            "block constructed"
        );
        Ok(block)
    }

    /// Height-0 block with no predecessor and no credentials.
    pub fn genesis(signer: &dyn Signer, registry: &AuthorityRegistry) -> Result<Self, BlockError> {
        Self::construct::<&str>(&[], None, 0, signer, registry)
    }

    /// Digest the signature is produced over.
    pub fn signing_digest(&self) -> Digest {
        let mut hasher = ContentHasher::BLOCK_SIGNING.hasher();
        self.update_fields(&mut hasher);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Recompute the block hash from the current field values.
    pub fn compute_hash(&self) -> Digest {
        let mut hasher = ContentHasher::BLOCK.hasher();
        self.update_fields(&mut hasher);
        hasher.update(&self.signature);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    fn update_fields(&self, hasher: &mut blake3::Hasher) {
        if let Some(prev) = &self.prev_hash {
            hasher.update(prev.as_bytes());
        }
        for hash in &self.credential_hashes {
            hasher.update(hash.as_str().as_bytes());
        }
        hasher.update(self.merkle_root.as_bytes());
        hasher.update(&self.timestamp.to_be_bytes());
        hasher.update(&self.height.to_be_bytes());
        hasher.update(&self.signer.as_bytes());
    }

    /// Check the stored signature against `key`.
    ///
    /// Empty, odd-length or wrong-length signatures are rejected without
    /// attempting verification.
    pub fn verify_signature(&self, key: &VerifyingKey) -> bool {
        if self.signature.is_empty() || self.signature.len() % 2 != 0 {
            return false;
        }
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(self.signing_digest().as_bytes(), &signature).is_ok()
    }

    pub fn verify_own_signature(&self) -> bool {
        self.verify_signature(&self.signer)
    }

    /// Self-consistency checks, no linkage.
    pub fn validate_self(&self) -> Result<(), BlockError> {
        self.validate_self_at(time::unix_now())
    }

    /// [`validate_self`](Self::validate_self) against an explicit clock.
    pub fn validate_self_at(&self, now: i64) -> Result<(), BlockError> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(BlockError::HashMismatch {
                expected: computed,
                actual: self.hash,
            });
        }

        let limit = time::latest_acceptable(now);
        if self.timestamp > limit {
            return Err(BlockError::TimestampInFuture {
                timestamp: self.timestamp,
                limit,
            });
        }

        let digests = self.credential_digests()?;
        let root = merkle_root_of(&digests)?;
        if root != self.merkle_root {
            return Err(BlockError::MerkleRootMismatch {
                expected: root,
                actual: self.merkle_root,
            });
        }

        Ok(())
    }

    fn credential_digests(&self) -> Result<Vec<Digest>, BlockError> {
        self.credential_hashes
            .iter()
            .enumerate()
            .map(|(index, hash)| {
                hash.check()
                    .and_then(|()| hash.to_digest())
                    .map_err(|source| BlockError::MalformedCredentialHash { index, source })
            })
            .collect()
    }

    pub fn contains_credential(&self, credential_id: &str) -> bool {
        self.credential_hashes
            .iter()
            .any(|hash| hash.matches_id(credential_id))
    }

    /// Inclusion proof for `credential_id`, if this block holds it.
    pub fn prove_membership(&self, credential_id: &str) -> Option<MerkleProof> {
        let index = self
            .credential_hashes
            .iter()
            .position(|hash| hash.matches_id(credential_id))?;
        let digests = self.credential_digests().ok()?;
        generate_proof(&digests, index)
    }

    /// Check a proof for `credential_id` against this block's Merkle root.
    pub fn verify_membership(&self, credential_id: &str, proof: &MerkleProof) -> bool {
        verify_credential(credential_id, proof, &self.merkle_root)
    }

    pub fn credential_count(&self) -> usize {
        self.credential_hashes.len()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.prev_hash.is_none()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BlockError> {
        bincode::serialize(self).map_err(|e| BlockError::Encoding(e.to_string()))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, BlockError> {
        bincode::deserialize(data).map_err(|e| BlockError::Encoding(e.to_string()))
    }
}

/// Verify a credential against a Merkle root using only the raw identifier.
pub fn verify_credential(credential_id: &str, proof: &MerkleProof, root: &Digest) -> bool {
    let leaf = Digest::of(credential_id.as_bytes());
    verify_proof(leaf.as_bytes(), proof, root)
}

fn merkle_root_of(digests: &[Digest]) -> Result<Digest, BlockError> {
    if digests.is_empty() {
        return Ok(Digest::null());
    }
    Ok(MerkleTree::build(digests)?.root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cred_crypto::{KeyPairSigner, SignerError, SIGNATURE_LEN};
    use proptest::prelude::*;

    fn authorized() -> (KeyPairSigner, AuthorityRegistry) {
        let signer = KeyPairSigner::generate();
        let registry = AuthorityRegistry::with_authorities([("registrar", signer.public_key())]);
        (signer, registry)
    }

    fn sample_block() -> (Block, KeyPairSigner) {
        let (signer, registry) = authorized();
        let genesis = Block::genesis(&signer, &registry).unwrap();
        let block = Block::construct(
            &["CERT-001", "CERT-002", "CERT-003"],
            Some(genesis.hash),
            1,
            &signer,
            &registry,
        )
        .unwrap();
        (block, signer)
    }

    fn fresh_key() -> VerifyingKey {
        cred_crypto::SigningKey::generate().verifying_key()
    }

    struct OfflineSigner(VerifyingKey);

    impl Signer for OfflineSigner {
        fn public_key(&self) -> VerifyingKey {
            self.0.clone()
        }

        fn sign(&self, _digest: &[u8]) -> Result<Signature, SignerError> {
            Err(SignerError::Unavailable("token removed".into()))
        }
    }

    #[test]
    fn genesis_shape() {
        let (signer, registry) = authorized();
        let genesis = Block::genesis(&signer, &registry).unwrap();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.credential_count(), 0);
        assert!(genesis.merkle_root.is_null());
        assert!(genesis.validate_self().is_ok());
        assert!(genesis.verify_signature(&signer.public_key()));
    }

    #[test]
    fn constructed_block_is_self_valid() {
        let (block, signer) = sample_block();
        assert_eq!(block.height, 1);
        assert_eq!(block.signature.len(), SIGNATURE_LEN);
        assert_eq!(block.hash, block.compute_hash());
        assert!(block.validate_self().is_ok());
        assert!(block.verify_signature(&signer.public_key()));
        assert!(block.verify_own_signature());
    }

    #[test]
    fn merkle_root_commits_to_credential_digests() {
        let (block, _) = sample_block();
        let digests = [
            Digest::of(b"CERT-001"),
            Digest::of(b"CERT-002"),
            Digest::of(b"CERT-003"),
        ];
        assert_eq!(block.merkle_root, MerkleTree::build(&digests).unwrap().root());
    }

    #[test]
    fn unauthorized_signer_is_rejected_before_signing() {
        let (_, registry) = authorized();
        let outsider = OfflineSigner(fresh_key());
        let err = Block::genesis(&outsider, &registry).unwrap_err();
        assert!(matches!(err, BlockError::Unauthorized { .. }));
    }

    #[test]
    fn signer_failure_is_reported() {
        let key = fresh_key();
        let registry = AuthorityRegistry::with_authorities([("hsm", key.clone())]);
        let err = Block::genesis(&OfflineSigner(key), &registry).unwrap_err();
        assert_eq!(
            err,
            BlockError::Signing(SignerError::Unavailable("token removed".into()))
        );
    }

    #[test]
    fn wrong_key_fails_verification() {
        let (block, _) = sample_block();
        assert!(!block.verify_signature(&fresh_key()));
    }

    #[test]
    fn malformed_signatures_fail_verification() {
        let (mut block, signer) = sample_block();
        let key = signer.public_key();

        block.signature.clear();
        assert!(!block.verify_signature(&key));

        block.signature = vec![1u8; 63];
        assert!(!block.verify_signature(&key));

        block.signature = vec![1u8; 62];
        assert!(!block.verify_signature(&key));

        block.signature = vec![1u8; 128];
        assert!(!block.verify_signature(&key));
    }

    #[test]
    fn tampered_hash_fails() {
        let (mut block, _) = sample_block();
        block.hash = Digest::of(b"forged");
        assert!(matches!(
            block.validate_self(),
            Err(BlockError::HashMismatch { .. })
        ));
    }

    #[test]
    fn tampered_prev_hash_fails() {
        let (mut block, _) = sample_block();
        block.prev_hash = Some(Digest::of(b"elsewhere"));
        assert!(block.validate_self().is_err());
    }

    #[test]
    fn tampered_timestamp_fails() {
        let (mut block, _) = sample_block();
        block.timestamp -= 1;
        assert!(block.validate_self().is_err());
    }

    #[test]
    fn tampered_credentials_fail() {
        let (mut block, _) = sample_block();
        block.credential_hashes[0] = CredentialHash::from_id("CERT-999");
        assert!(block.validate_self().is_err());
    }

    #[test]
    fn tampered_signature_fails() {
        let (mut block, _) = sample_block();
        block.signature[0] ^= 0xff;
        assert!(block.validate_self().is_err());
        assert!(!block.verify_own_signature());
    }

    #[test]
    fn future_timestamp_fails() {
        let (signer, registry) = authorized();
        let now = 1_700_000_000;
        let block = Block::construct_at(
            &["CERT-001"],
            None,
            0,
            now + time::MAX_CLOCK_SKEW_SECS + 1,
            &signer,
            &registry,
        )
        .unwrap();
        assert!(matches!(
            block.validate_self_at(now),
            Err(BlockError::TimestampInFuture { .. })
        ));
        assert!(block.validate_self_at(now + 1).is_ok());
    }

    #[test]
    fn malformed_credential_hash_is_reported_with_index() {
        let (signer, registry) = authorized();
        let mut block =
            Block::construct(&["CERT-001", "CERT-002"], None, 0, &signer, &registry).unwrap();
        block.credential_hashes[1] = CredentialHash::from_raw("not-hex");
        block.hash = block.compute_hash();

        match block.validate_self() {
            Err(BlockError::MalformedCredentialHash { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn inconsistent_merkle_root_fails() {
        let (mut block, _) = sample_block();
        block.merkle_root = Digest::of(b"other root");
        block.hash = block.compute_hash();
        assert!(matches!(
            block.validate_self(),
            Err(BlockError::MerkleRootMismatch { .. })
        ));
    }

    #[test]
    fn membership_proofs() {
        let (block, _) = sample_block();
        assert!(block.contains_credential("CERT-002"));
        assert!(!block.contains_credential("CERT-404"));

        let proof = block.prove_membership("CERT-002").unwrap();
        assert!(block.verify_membership("CERT-002", &proof));
        assert!(!block.verify_membership("CERT-001", &proof));
        assert!(verify_credential("CERT-002", &proof, &block.merkle_root));

        assert!(block.prove_membership("CERT-404").is_none());
    }

    #[test]
    fn genesis_has_no_members() {
        let (signer, registry) = authorized();
        let genesis = Block::genesis(&signer, &registry).unwrap();
        assert!(genesis.prove_membership("CERT-001").is_none());
        assert!(!genesis.verify_membership("CERT-001", &MerkleProof::default()));
    }

    #[test]
    fn bytes_roundtrip() {
        let (block, _) = sample_block();
        let decoded = Block::from_bytes(&block.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.validate_self().is_ok());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            Block::from_bytes(&[0xde, 0xad]),
            Err(BlockError::Encoding(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn every_credential_proves_membership(
            ids in proptest::collection::vec("[A-Z]{4}-[0-9]{1,6}", 1..24),
        ) {
            let (signer, registry) = authorized();
            let block = Block::construct(&ids[..], None, 0, &signer, &registry).unwrap();
            for id in &ids {
                let proof = block.prove_membership(id).unwrap();
                prop_assert!(block.verify_membership(id, &proof));
            }
            prop_assert!(!block.contains_credential("absent-id"));
        }
    }
}
