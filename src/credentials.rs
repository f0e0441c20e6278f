//! Storage for the vision judge API key.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Name under which the judge API key is stored.
pub const API_KEY_NAME: &str = "openai_api_key";

/// Check the shape of an API key: `sk-` prefix and at least 20 characters.
pub fn validate_api_key(key: &str) -> bool {
    let trimmed = key.trim();
    trimmed.starts_with("sk-") && trimmed.len() >= 20
}

/// Key/value store for the single judge credential.
pub trait CredentialStore: Send + Sync {
    fn save(&self, key: &str) -> Result<()>;

    fn get(&self) -> Result<Option<String>>;

    fn remove(&self) -> Result<()>;

    fn has(&self) -> Result<bool> {
        Ok(self.get()?.is_some_and(|k| !k.trim().is_empty()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    secrets: BTreeMap<String, String>,
}

/// Credentials kept in a TOML file next to the config, readable only by the owner.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        toml::from_str(&content).with_context(|| format!("Malformed {}", self.path.display()))
    }

    fn write(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(file)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&self, key: &str) -> Result<()> {
        if !validate_api_key(key) {
            bail!("API key must start with 'sk-' and be at least 20 characters");
        }
        let mut file = self.read()?;
        file.secrets
            .insert(API_KEY_NAME.to_string(), key.trim().to_string());
        self.write(&file)?;
        tracing::info!(path = %self.path.display(), "Saved API key");
        Ok(())
    }

    fn get(&self) -> Result<Option<String>> {
        Ok(self.read()?.secrets.remove(API_KEY_NAME))
    }

    fn remove(&self) -> Result<()> {
        let mut file = self.read()?;
        if file.secrets.remove(API_KEY_NAME).is_some() {
            self.write(&file)?;
            tracing::info!(path = %self.path.display(), "Removed API key");
        }
        Ok(())
    }
}

/// In-process credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &str) -> Self {
        Self {
            key: Mutex::new(Some(key.trim().to_string())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save(&self, key: &str) -> Result<()> {
        if !validate_api_key(key) {
            bail!("API key must start with 'sk-' and be at least 20 characters");
        }
        let mut slot = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        *slot = Some(key.trim().to_string());
        Ok(())
    }

    fn get(&self) -> Result<Option<String>> {
        let slot = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        Ok(slot.clone())
    }

    fn remove(&self) -> Result<()> {
        let mut slot = self
            .key
            .lock()
            .map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}
