use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::hasher::ContentHasher;

/// Length of an Ed25519 signature in bytes (`R || S`).
pub const SIGNATURE_LEN: usize = 64;

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public). This is an authority's public identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey(#[serde(with = "verifying_key_serde")] ed25519_dalek::VerifyingKey);

/// Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self::from_bytes(arr))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message))
    }

    /// Raw secret key bytes. Only the keystore should need these.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl VerifyingKey {
    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
        use ed25519_dalek::Verifier;
        self.0
            .verify(message, &signature.0)
            .map_err(|_| SignatureError::InvalidSignature)
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, SignatureError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self(key))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Self::from_bytes(arr)
    }

    /// Derive the opaque address token for this key.
    pub fn address(&self) -> Address {
        let digest = ContentHasher::ADDRESS.hash(&self.0.to_bytes());
        Address(format!("cred{}", hex::encode(&digest.as_bytes()[..20])))
    }
}

impl Hash for VerifyingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bytes().hash(state);
    }
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Parse `R || S` bytes. Anything other than 64 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| SignatureError::MalformedSignature(bytes.len()))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&arr)))
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Display for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

/// Opaque identity token derived from a public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability that produces block signatures.
///
/// The ledger only needs these three operations; how and where the private
/// key lives is up to the implementation.
pub trait Signer: Send + Sync {
    /// Public identity checked against the authority allow-list.
    fn public_key(&self) -> VerifyingKey;

    /// Opaque identity-derived token.
    fn address(&self) -> Address {
        self.public_key().address()
    }

    /// Sign a digest.
    fn sign(&self, digest: &[u8]) -> Result<Signature, SignerError>;
}

/// [`Signer`] backed by an in-process Ed25519 key pair.
#[derive(Debug)]
pub struct KeyPairSigner {
    key: SigningKey,
}

impl KeyPairSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn generate() -> Self {
        Self::new(SigningKey::generate())
    }
}

impl Signer for KeyPairSigner {
    fn public_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    fn sign(&self, digest: &[u8]) -> Result<Signature, SignerError> {
        Ok(self.key.sign(digest))
    }
}

impl<T: Signer + ?Sized> Signer for &T {
    fn public_key(&self) -> VerifyingKey {
        (**self).public_key()
    }

    fn address(&self) -> Address {
        (**self).address()
    }

    fn sign(&self, digest: &[u8]) -> Result<Signature, SignerError> {
        (**self).sign(digest)
    }
}

/// Errors from verification and key parsing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("malformed signature: expected 64 bytes, got {0}")]
    MalformedSignature(usize),
    #[error("invalid key")]
    InvalidKey,
}

/// Errors a [`Signer`] may report.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

mod verifying_key_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &ed25519_dalek::VerifyingKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(key.as_bytes())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ed25519_dalek::VerifyingKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32-byte public key"))?;
        ed25519_dalek::VerifyingKey::from_bytes(&arr)
            .map_err(|_| serde::de::Error::custom("invalid ed25519 public key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let sk = SigningKey::generate();
        let vk = sk.verifying_key();
        let sig = sk.sign(b"hello world");
        assert!(vk.verify(b"hello world", &sig).is_ok());
    }

    #[test]
    fn verify_fails_on_wrong_message() {
        let sk = SigningKey::generate();
        let sig = sk.sign(b"correct message");
        assert_eq!(
            sk.verifying_key().verify(b"wrong message", &sig),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let sk1 = SigningKey::generate();
        let sk2 = SigningKey::generate();
        let sig = sk1.sign(b"message");
        assert!(sk2.verifying_key().verify(b"message", &sig).is_err());
    }

    #[test]
    fn from_bytes_roundtrip() {
        let sk = SigningKey::generate();
        let sk2 = SigningKey::from_bytes(*sk.as_bytes());
        assert_eq!(sk.verifying_key(), sk2.verifying_key());
    }

    #[test]
    fn hex_roundtrips() {
        let sk = SigningKey::generate();
        let sk2 = SigningKey::from_hex(&hex::encode(sk.as_bytes())).unwrap();
        assert_eq!(sk.verifying_key(), sk2.verifying_key());

        let vk = sk.verifying_key();
        assert_eq!(VerifyingKey::from_hex(&vk.to_hex()).unwrap(), vk);
        assert_eq!(VerifyingKey::from_hex("abcd"), Err(SignatureError::InvalidKey));
    }

    #[test]
    fn signature_slice_roundtrip() {
        let sk = SigningKey::generate();
        let sig = sk.sign(b"test");
        let parsed = Signature::from_slice(&sig.to_bytes()).unwrap();
        assert_eq!(sig, parsed);
    }

    #[test]
    fn signature_slice_rejects_wrong_length() {
        assert_eq!(
            Signature::from_slice(&[0u8; 63]),
            Err(SignatureError::MalformedSignature(63))
        );
    }

    #[test]
    fn verifying_key_serde_roundtrip() {
        let vk = SigningKey::generate().verifying_key();
        let json = serde_json::to_string(&vk).unwrap();
        let parsed: VerifyingKey = serde_json::from_str(&json).unwrap();
        assert_eq!(vk, parsed);
    }

    #[test]
    fn address_is_deterministic_and_distinct() {
        let sk1 = SigningKey::generate();
        let sk2 = SigningKey::generate();
        let a1 = sk1.verifying_key().address();
        assert_eq!(a1, sk1.verifying_key().address());
        assert_ne!(a1, sk2.verifying_key().address());
        assert!(a1.as_str().starts_with("cred"));
        assert_eq!(a1.as_str().len(), 4 + 40);
    }

    #[test]
    fn key_pair_signer_signs_for_its_key() {
        let signer = KeyPairSigner::generate();
        let sig = signer.sign(b"digest").unwrap();
        assert!(signer.public_key().verify(b"digest", &sig).is_ok());
        assert_eq!(signer.address(), signer.public_key().address());
    }

    #[test]
    fn debug_redacts_signing_key() {
        let debug = format!("{:?}", KeyPairSigner::generate());
        assert!(debug.contains("redacted"));
    }
}
