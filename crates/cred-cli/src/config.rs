use std::path::{Path, PathBuf};

use anyhow::Context;
use cred_store::{FileStoreConfig, SyncMode};
use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "cred.toml";

/// CLI settings, layered: defaults, then `cred.toml`, then environment,
/// then command-line flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data_dir: PathBuf,
    /// Allow-list file; defaults to `<data_dir>/authorities.json`.
    pub authorities_file: Option<PathBuf>,
    /// Keystore file; defaults to `<data_dir>/keystore.json`.
    pub keystore_file: Option<PathBuf>,
    pub sync_mode: SyncMode,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".cred"),
            authorities_file: None,
            keystore_file: None,
            sync_mode: SyncMode::default(),
        }
    }
}

impl CliConfig {
    /// Load from `path`, or from `cred.toml` if present, then apply env overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).is_file() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("CRED_DATA_DIR") {
            self.data_dir = dir.into();
        }
        if let Some(file) = lookup("CRED_AUTHORITIES") {
            self.authorities_file = Some(file.into());
        }
        if let Some(file) = lookup("CRED_KEYSTORE") {
            self.keystore_file = Some(file.into());
        }
    }

    pub fn authorities_path(&self) -> PathBuf {
        self.authorities_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("authorities.json"))
    }

    pub fn keystore_path(&self) -> PathBuf {
        self.keystore_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("keystore.json"))
    }

    /// Directory the chain store lives in.
    pub fn chain_dir(&self) -> PathBuf {
        self.data_dir.join("chain")
    }

    pub fn store_config(&self) -> FileStoreConfig {
        FileStoreConfig {
            sync_mode: self.sync_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_live_under_data_dir() {
        let config = CliConfig::default();
        assert_eq!(config.authorities_path(), PathBuf::from(".cred/authorities.json"));
        assert_eq!(config.keystore_path(), PathBuf::from(".cred/keystore.json"));
        assert_eq!(config.sync_mode, SyncMode::EveryWrite);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CliConfig::from_toml(
            r#"
            data_dir = "/var/lib/cred"
            sync_mode = "os-default"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/cred"));
        assert_eq!(config.sync_mode, SyncMode::OsDefault);
        assert_eq!(
            config.keystore_path(),
            PathBuf::from("/var/lib/cred/keystore.json")
        );
    }

    #[test]
    fn unknown_sync_mode_is_rejected() {
        assert!(CliConfig::from_toml(r#"sync_mode = "sometimes""#).is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("CRED_DATA_DIR", "/srv/ledger"),
            ("CRED_AUTHORITIES", "/etc/cred/authorities.json"),
        ]
        .into_iter()
        .collect();

        let mut config = CliConfig::from_toml(r#"data_dir = "/var/lib/cred""#).unwrap();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/srv/ledger"));
        assert_eq!(
            config.authorities_path(),
            PathBuf::from("/etc/cred/authorities.json")
        );
        assert_eq!(config.keystore_path(), PathBuf::from("/srv/ledger/keystore.json"));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = CliConfig::from_file(&dir.path().join("cred.toml")).unwrap_err();
        assert!(err.to_string().contains("reading config"));
    }
}
