use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::{Digest, DIGEST_LEN};
use crate::error::TypeError;

/// Hex-encoded one-way hash of a raw credential identifier.
///
/// Blocks store these instead of the identifiers themselves. The value is
/// kept as text because that is what gets persisted and signed; a stored
/// value is only trusted after [`CredentialHash::check`] accepts it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Length of a well-formed credential hash in hex characters.
    pub const HEX_LEN: usize = DIGEST_LEN * 2;

    /// Hash a raw credential identifier.
    pub fn from_id(credential_id: &str) -> Self {
        Self::from_digest(&Digest::of(credential_id.as_bytes()))
    }

    pub fn from_digest(digest: &Digest) -> Self {
        Self(digest.to_hex())
    }

    /// Wrap an already-encoded value without checking it.
    ///
    /// Used when reading back untrusted data; call [`check`](Self::check)
    /// before relying on it.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Verify the value is exactly 64 hex characters.
    pub fn check(&self) -> Result<(), TypeError> {
        if self.0.len() != Self::HEX_LEN {
            return Err(TypeError::InvalidLength {
                expected: Self::HEX_LEN,
                actual: self.0.len(),
            });
        }
        hex::decode(&self.0).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(())
    }

    /// Decode into the 32-byte digest used as a Merkle leaf.
    pub fn to_digest(&self) -> Result<Digest, TypeError> {
        Digest::from_hex(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the hash of `credential_id`.
    pub fn matches_id(&self, credential_id: &str) -> bool {
        *self == Self::from_id(credential_id)
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialHash({})", self.0)
    }
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_id_is_well_formed() {
        let hash = CredentialHash::from_id("CERT-001");
        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.check().is_ok());
    }

    #[test]
    fn from_id_matches_digest() {
        let hash = CredentialHash::from_id("CERT-001");
        assert_eq!(hash.to_digest().unwrap(), Digest::of(b"CERT-001"));
    }

    #[test]
    fn matches_id_only_for_same_id() {
        let hash = CredentialHash::from_id("CERT-001");
        assert!(hash.matches_id("CERT-001"));
        assert!(!hash.matches_id("CERT-002"));
    }

    #[test]
    fn check_rejects_short_value() {
        let err = CredentialHash::from_raw("abc").check().unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 64,
                actual: 3
            }
        );
    }

    #[test]
    fn check_rejects_non_hex() {
        let err = CredentialHash::from_raw("g".repeat(64)).check().unwrap_err();
        assert!(matches!(err, TypeError::InvalidHex(_)));
    }

    #[test]
    fn serializes_as_plain_string() {
        let hash = CredentialHash::from_id("x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.as_str()));
    }

    proptest! {
        #[test]
        fn any_id_hashes_to_valid_value(id in ".*") {
            let hash = CredentialHash::from_id(&id);
            prop_assert!(hash.check().is_ok());
            prop_assert!(hash.matches_id(&id));
        }
    }
}
