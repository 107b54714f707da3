//! Durable storage behind the credential store.
//!
//! Credentials are persisted as three entries under fixed key names. A
//! backend only moves strings; deciding whether the entries form a valid
//! session is the store's job.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use keyring::Entry;
use tracing::debug;

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "token";
/// Key holding the role string (`ADMIN` / `FRIEND`)
pub const ROLE_KEY: &str = "role";
/// Key holding the display name
pub const USERNAME_KEY: &str = "username";

pub const CREDENTIAL_KEYS: [&str; 3] = [TOKEN_KEY, ROLE_KEY, USERNAME_KEY];

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service name
const SERVICE_NAME: &str = "hearth";

pub trait CredentialBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write_all(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove the given keys. Missing keys are not an error.
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

impl<T: CredentialBackend + ?Sized> CredentialBackend for Box<T> {
    fn read(&self, key: &str) -> Result<Option<String>> {
        (**self).read(key)
    }

    fn write_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).write_all(entries)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        (**self).remove_all(keys)
    }
}

/// JSON key/value file in the cache directory.
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }

    fn load_map(&self) -> Result<BTreeMap<String, String>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn save_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let path = self.session_path();
        if map.is_empty() {
            if path.exists() {
                std::fs::remove_file(&path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let contents = serde_json::to_string_pretty(map)?;

        // Write then rename so a crash never leaves a half-written file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }
}

impl CredentialBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load_map()?.remove(key))
    }

    fn write_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.load_map().unwrap_or_default();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.save_map(&map)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.load_map().unwrap_or_default();
        for key in keys {
            map.remove(*key);
        }
        self.save_map(&map)
    }
}

/// OS keychain, one entry per key.
///
/// On Linux this is the kernel keyutils session keyring, which lasts for the
/// login session; use the file backend to survive a reboot.
pub struct KeyringBackend {
    service: String,
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringBackend {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Keep entries under a different keychain service name
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl CredentialBackend for KeyringBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read from keychain"),
        }
    }

    fn write_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.entry(key)?
                .set_password(value)
                .context("Failed to store value in keychain")?;

            // A keychain that accepts writes but forgets them is a failure
            if self.read(key)?.as_deref() != Some(*value) {
                bail!("Keychain did not retain '{}'", key);
            }
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => return Err(e).context("Failed to delete keychain entry"),
            }
        }
        debug!(service = %self.service, "Keychain entries removed");
        Ok(())
    }
}

/// In-process storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate entries, e.g. to simulate a previous run
    pub fn with_entries(entries: &[(&str, &str)]) -> Self {
        let backend = Self::new();
        for (key, value) in entries {
            backend.lock().insert((*key).to_string(), (*value).to_string());
        }
        backend
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn write_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.lock();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}
