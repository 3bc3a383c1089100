//! Vault settings and remote layout.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use nexusvault_common::{Error, Result};
use nexusvault_crypto::KdfParams;
use nexusvault_storage::{CommitAuthor, DEFAULT_HOST, DEFAULT_REPOSITORY};

/// Encrypted vault index.
pub const INDEX_PATH: &str = ".config/index";

/// Directory holding share pointers.
pub const SHARED_DIR: &str = "shared";

/// Encrypted share index.
pub const SHARE_INDEX_PATH: &str = "shared/.config/index";

/// Repository path of the pointer for a share reference.
pub fn shared_pointer_path(reference: &str) -> String {
    format!("{}/{}", SHARED_DIR, reference)
}

/// Placeholder replaced by the operation name in commit messages.
pub const ACTION_PLACEHOLDER: &str = "{action}";

const MIN_FILE_HASH_LENGTH: usize = 16;
const MAX_FILE_HASH_LENGTH: usize = 128;
const MIN_SHARE_REFERENCE_LENGTH: usize = 4;
const MAX_SHARE_REFERENCE_LENGTH: usize = 64;

/// User settings.
///
/// Stored as JSON in the user's configuration directory. Missing fields take
/// their defaults, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Author name recorded on every commit.
    pub commit_author_name: String,
    /// Author email recorded on every commit.
    pub commit_author_email: String,
    /// Commit message template. `{action}` becomes e.g. "Upload".
    pub commit_message: String,
    /// Length of storage names in hex characters.
    pub file_hash_length: usize,
    /// Length of share references in base-62 characters.
    pub share_reference_length: usize,
    /// Key derivation parameters for new envelopes.
    pub kdf: KdfParams,
    /// Reject a publish if the remote moved since it was last observed.
    pub strict_publish: bool,
    /// Repository name under the owner's account.
    pub repository: String,
    /// Repository host.
    pub host: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            commit_author_name: "Nexus CLI".to_string(),
            commit_author_email: "nexus@cli.io".to_string(),
            commit_message: "Nexus: {action}".to_string(),
            file_hash_length: 32,
            share_reference_length: 8,
            kdf: KdfParams::interactive(),
            strict_publish: false,
            repository: DEFAULT_REPOSITORY.to_string(),
            host: DEFAULT_HOST.to_string(),
        }
    }
}

impl Settings {
    /// Default settings file: `<config dir>/nexus/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nexus").join("settings.json"))
    }

    /// Load settings from `path`. A missing file yields defaults.
    ///
    /// # Errors
    /// - File exists but cannot be read
    /// - Content is not valid settings JSON
    /// - Loaded values fail [`Settings::validate`]
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Serialization(format!("{}: {}", path.display(), e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.commit_author_name.trim().is_empty() || self.commit_author_email.trim().is_empty()
        {
            return Err(Error::InvalidInput(
                "Commit author name and email must be set".to_string(),
            ));
        }
        if self.commit_message.trim().is_empty() {
            return Err(Error::InvalidInput(
                "Commit message template must not be empty".to_string(),
            ));
        }
        if !(MIN_FILE_HASH_LENGTH..=MAX_FILE_HASH_LENGTH).contains(&self.file_hash_length)
            || self.file_hash_length % 2 != 0
        {
            return Err(Error::InvalidInput(format!(
                "file_hash_length must be an even number between {} and {}",
                MIN_FILE_HASH_LENGTH, MAX_FILE_HASH_LENGTH
            )));
        }
        if !(MIN_SHARE_REFERENCE_LENGTH..=MAX_SHARE_REFERENCE_LENGTH)
            .contains(&self.share_reference_length)
        {
            return Err(Error::InvalidInput(format!(
                "share_reference_length must be between {} and {}",
                MIN_SHARE_REFERENCE_LENGTH, MAX_SHARE_REFERENCE_LENGTH
            )));
        }
        if !self.kdf.is_within_bounds() {
            return Err(Error::InvalidInput(
                "KDF parameters out of range".to_string(),
            ));
        }
        if self.repository.is_empty() || self.host.is_empty() {
            return Err(Error::InvalidInput(
                "Repository and host must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Commit author built from the configured name and email.
    pub fn commit_author(&self) -> CommitAuthor {
        CommitAuthor::new(&self.commit_author_name, &self.commit_author_email)
    }

    /// Commit message for an operation.
    pub fn commit_message_for(&self, action: &str) -> String {
        self.commit_message.replace(ACTION_PLACEHOLDER, action)
    }

    /// Storage names are hex, two characters per random byte.
    pub fn file_hash_bytes(&self) -> usize {
        self.file_hash_length / 2
    }
}
