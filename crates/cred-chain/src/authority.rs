use std::collections::BTreeMap;
use std::path::Path;

use cred_crypto::VerifyingKey;

use crate::error::AuthorityError;

/// A named public key allowed to sign blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authority {
    pub name: String,
    pub key: VerifyingKey,
}

/// Allow-list of authorities permitted to produce blocks.
///
/// Owned by the chain and passed by reference to block construction. An
/// empty registry authorizes nobody.
#[derive(Clone, Debug, Default)]
pub struct AuthorityRegistry {
    authorities: Vec<Authority>,
}

impl AuthorityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorities<I, N>(authorities: I) -> Self
    where
        I: IntoIterator<Item = (N, VerifyingKey)>,
        N: Into<String>,
    {
        let mut registry = Self::new();
        for (name, key) in authorities {
            registry.add(name, key);
        }
        registry
    }

    /// Add an authority. Re-adding a known key renames it.
    pub fn add(&mut self, name: impl Into<String>, key: VerifyingKey) {
        let name = name.into();
        match self.authorities.iter_mut().find(|a| a.key == key) {
            Some(existing) => existing.name = name,
            None => self.authorities.push(Authority { name, key }),
        }
    }

    /// Remove an authority. Returns whether it was present.
    pub fn remove(&mut self, key: &VerifyingKey) -> bool {
        let before = self.authorities.len();
        self.authorities.retain(|a| a.key != *key);
        self.authorities.len() != before
    }

    pub fn is_authorized(&self, key: &VerifyingKey) -> bool {
        self.authorities.iter().any(|a| a.key == *key)
    }

    pub fn name_of(&self, key: &VerifyingKey) -> Option<&str> {
        self.authorities
            .iter()
            .find(|a| a.key == *key)
            .map(|a| a.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.iter()
    }

    /// Parse an allow-list: a JSON object mapping name to hex public key.
    pub fn from_json(json: &str) -> Result<Self, AuthorityError> {
        let entries: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| AuthorityError::Parse(e.to_string()))?;

        let mut registry = Self::new();
        for (name, key_hex) in entries {
            let key = VerifyingKey::from_hex(&key_hex)
                .map_err(|_| AuthorityError::InvalidKey { name: name.clone() })?;
            registry.add(name, key);
        }
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, AuthorityError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String, AuthorityError> {
        let entries: BTreeMap<&str, String> = self
            .authorities
            .iter()
            .map(|a| (a.name.as_str(), a.key.to_hex()))
            .collect();
        serde_json::to_string_pretty(&entries).map_err(|e| AuthorityError::Parse(e.to_string()))
    }
}
