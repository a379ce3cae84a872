use cred_types::Digest;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag, prepended as `"<domain>:"` to every
/// computation.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Block identity hash (covers the signature).
    pub const BLOCK: Self = Self {
        domain: "cred-block-v1",
    };
    /// Digest an authority signs (everything except hash and signature).
    pub const BLOCK_SIGNING: Self = Self {
        domain: "cred-block-signing-v1",
    };
    /// Address derivation from a public key.
    pub const ADDRESS: Self = Self {
        domain: "cred-address-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = self.hasher();
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// An incremental hasher already seeded with the domain tag.
    pub fn hasher(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Raw BLAKE3 hash without domain separation. Merkle nodes and
    /// credential hashes use this form.
    pub fn raw_hash(data: &[u8]) -> Digest {
        Digest::of(data)
    }

    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(
            ContentHasher::BLOCK.hash(b"block"),
            ContentHasher::BLOCK.hash(b"block")
        );
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        let block = ContentHasher::BLOCK.hash(data);
        let signing = ContentHasher::BLOCK_SIGNING.hash(data);
        let address = ContentHasher::ADDRESS.hash(data);
        assert_ne!(block, signing);
        assert_ne!(block, address);
        assert_ne!(signing, address);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = ContentHasher::BLOCK.hasher();
        hasher.update(b"part one ");
        hasher.update(b"part two");
        let incremental = Digest::from_hash(*hasher.finalize().as_bytes());
        assert_eq!(incremental, ContentHasher::BLOCK.hash(b"part one part two"));
    }

    #[test]
    fn raw_hash_has_no_domain() {
        let raw = ContentHasher::raw_hash(b"test");
        assert_eq!(raw, Digest::of(b"test"));
        assert_ne!(raw, ContentHasher::BLOCK.hash(b"test"));
    }

    #[test]
    fn custom_domain() {
        let hasher = ContentHasher::new("my-domain-v1");
        assert_eq!(hasher.domain(), "my-domain-v1");
        assert_ne!(hasher.hash(b"data"), ContentHasher::BLOCK.hash(b"data"));
    }
}
