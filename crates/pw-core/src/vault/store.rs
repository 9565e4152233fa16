//! Durable storage for the escalation secret and its hash.

use pw_common::{Error, Result, Secret};
use pw_config::write_atomic;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Service name every account lives under.
pub const SERVICE: &str = "system";

/// Named slots in the secret store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretAccount {
    /// Raw escalation secret, handed to the escalation program.
    Escalation,
    /// PHC-format Argon2 hash of the escalation secret.
    EscalationHash,
}

impl SecretAccount {
    pub fn service(&self) -> &'static str {
        SERVICE
    }

    pub fn account(&self) -> &'static str {
        match self {
            SecretAccount::Escalation => "sudo",
            SecretAccount::EscalationHash => "sudo_hashed",
        }
    }

    fn key(&self) -> String {
        format!("{}/{}", self.service(), self.account())
    }
}

/// Backend holding secrets by account.
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    fn get(&self, account: SecretAccount) -> Result<Option<Secret>>;
    fn set(&self, account: SecretAccount, value: &Secret) -> Result<()>;
    /// Returns whether something was removed.
    fn delete(&self, account: SecretAccount) -> Result<bool>;
}

/// JSON file readable only by the owner, rewritten atomically.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSecretStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                Error::SecretStore(format!("{} is not valid JSON: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(store_io(&self.path, e)),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(map)?;
        bytes.push(b'\n');
        write_atomic(&self.path, &bytes, true).map_err(|e| store_io(&self.path, e))
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn store_io(path: &Path, e: std::io::Error) -> Error {
    Error::SecretStore(format!("{}: {}", path.display(), e))
}

impl SecretStore for FileSecretStore {
    fn get(&self, account: SecretAccount) -> Result<Option<Secret>> {
        let _guard = self.guard();
        Ok(self.read_map()?.remove(&account.key()).map(Secret::from))
    }

    fn set(&self, account: SecretAccount, value: &Secret) -> Result<()> {
        let _guard = self.guard();
        let mut map = self.read_map()?;
        map.insert(account.key(), value.expose().to_string());
        self.write_map(&map)?;
        debug!(account = account.account(), "stored secret");
        Ok(())
    }

    fn delete(&self, account: SecretAccount) -> Result<bool> {
        let _guard = self.guard();
        let mut map = self.read_map()?;
        if map.remove(&account.key()).is_none() {
            return Ok(false);
        }
        self.write_map(&map)?;
        Ok(true)
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<SecretAccount, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<SecretAccount, Secret>> {
        self.secrets.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, account: SecretAccount) -> Result<Option<Secret>> {
        Ok(self.map().get(&account).cloned())
    }

    fn set(&self, account: SecretAccount, value: &Secret) -> Result<()> {
        self.map().insert(account, value.clone());
        Ok(())
    }

    fn delete(&self, account: SecretAccount) -> Result<bool> {
        Ok(self.map().remove(&account).is_some())
    }
}

/// OS keychain (Secret Service, macOS Keychain, Windows Credential Manager).
#[cfg(feature = "keyring")]
#[derive(Debug, Default)]
pub struct KeyringSecretStore;

#[cfg(feature = "keyring")]
impl KeyringSecretStore {
    pub fn new() -> Self {
        KeyringSecretStore
    }

    fn entry(account: SecretAccount) -> Result<keyring::Entry> {
        keyring::Entry::new(account.service(), account.account())
            .map_err(|e| Error::SecretStore(format!("keyring entry {}: {}", account.key(), e)))
    }
}

#[cfg(feature = "keyring")]
impl SecretStore for KeyringSecretStore {
    fn get(&self, account: SecretAccount) -> Result<Option<Secret>> {
        match Self::entry(account)?.get_password() {
            Ok(value) => Ok(Some(Secret::from(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::SecretStore(format!("keyring read {}: {}", account.key(), e))),
        }
    }

    fn set(&self, account: SecretAccount, value: &Secret) -> Result<()> {
        Self::entry(account)?
            .set_password(value.expose())
            .map_err(|e| Error::SecretStore(format!("keyring write {}: {}", account.key(), e)))
    }

    fn delete(&self, account: SecretAccount) -> Result<bool> {
        match Self::entry(account)?.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(Error::SecretStore(format!("keyring delete {}: {}", account.key(), e))),
        }
    }
}
