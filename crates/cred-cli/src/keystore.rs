use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cred_chain::AuthorityRegistry;
use cred_crypto::{KeyPairSigner, Signer, SigningKey, VerifyingKey};

/// JSON file of named signing keys (name to hex secret).
pub struct Keystore {
    path: PathBuf,
    keys: BTreeMap<String, String>,
}

impl Keystore {
    /// Load the keystore at `path`. A missing file is an empty keystore.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let keys = if path.is_file() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading keystore {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing keystore {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            keys,
        })
    }

    /// Generate and store a key pair under `name`.
    pub fn create(&mut self, name: &str) -> anyhow::Result<VerifyingKey> {
        if self.keys.contains_key(name) {
            bail!("identity {name:?} already exists");
        }
        let key = SigningKey::generate();
        let public = key.verifying_key();
        self.keys.insert(name.to_string(), hex::encode(key.as_bytes()));
        Ok(public)
    }

    pub fn signer(&self, name: &str) -> anyhow::Result<KeyPairSigner> {
        let secret = self
            .keys
            .get(name)
            .with_context(|| format!("no identity named {name:?} in {}", self.path.display()))?;
        let key = SigningKey::from_hex(secret)
            .with_context(|| format!("identity {name:?} has a malformed key"))?;
        Ok(KeyPairSigner::new(key))
    }

    /// Public keys of every stored identity, by name.
    pub fn identities(&self) -> anyhow::Result<Vec<(String, VerifyingKey)>> {
        self.keys
            .keys()
            .map(|name| Ok((name.clone(), self.signer(name)?.public_key())))
            .collect()
    }

    /// Allow-list made of every stored identity.
    pub fn registry(&self) -> anyhow::Result<AuthorityRegistry> {
        Ok(AuthorityRegistry::with_authorities(self.identities()?))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.keys)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing keystore {}", self.path.display()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Keystore::load(&dir.path().join("keystore.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn create_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keystore.json");

        let mut store = Keystore::load(&path).unwrap();
        let public = store.create("registrar").unwrap();
        store.save().unwrap();

        let reloaded = Keystore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.signer("registrar").unwrap().public_key(), public);
        assert!(reloaded.registry().unwrap().is_authorized(&public));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Keystore::load(&dir.path().join("keystore.json")).unwrap();
        store.create("registrar").unwrap();
        assert!(store.create("registrar").is_err());
    }

    #[test]
    fn unknown_signer_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Keystore::load(&dir.path().join("keystore.json")).unwrap();
        let err = store.signer("dean").unwrap_err();
        assert!(err.to_string().contains("no identity named"));
    }
}
