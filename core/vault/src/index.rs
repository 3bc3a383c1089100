//! The encrypted path index.
//!
//! One flat map from vault path to entry. Folders are explicit entries; a
//! file may live under a path whose parent was never created as a folder.
//! The whole map is serialized, encrypted under the vault password and
//! published as a single blob on every mutation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use nexusvault_common::{CryptoError, Error, IndexError, Result, VaultPath};
use nexusvault_crypto::{decrypt_with_password, encrypt_with_password, FileKey, KdfParams};

/// What an index entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// One vault path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultEntry {
    /// Random hex storage name of the content blob. Empty for folders.
    #[serde(default)]
    pub real_name: String,
    /// Hex of the file key sealed under the vault password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_key: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl VaultEntry {
    /// Entry for a stored file whose key is already sealed.
    pub fn file(real_name: impl Into<String>, sealed_key_hex: impl Into<String>) -> Self {
        Self {
            real_name: real_name.into(),
            file_key: Some(sealed_key_hex.into()),
            kind: EntryKind::File,
        }
    }

    pub fn folder() -> Self {
        Self {
            real_name: String::new(),
            file_key: None,
            kind: EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Seal `key` under the vault password as stored in the index.
    pub fn seal_key(key: &FileKey, password: &[u8], kdf: &KdfParams) -> Result<String> {
        let sealed = encrypt_with_password(key.as_bytes(), password, kdf)?;
        Ok(hex::encode(sealed))
    }

    /// Recover the raw file key.
    ///
    /// # Errors
    /// - Entry is a folder or has no key
    /// - `CryptoError::WrongPasswordOrCorrupt` if the sealed key does not open
    pub fn open_key(&self, password: &[u8]) -> Result<FileKey> {
        let sealed_hex = self
            .file_key
            .as_deref()
            .filter(|_| self.is_file())
            .ok_or_else(|| Error::InvalidInput("Entry has no file key".to_string()))?;
        let sealed = hex::decode(sealed_hex)
            .map_err(|e| CryptoError::InvalidKey(format!("bad hex encoding: {}", e)))?;
        let raw = zeroize::Zeroizing::new(decrypt_with_password(&sealed, password)?);
        FileKey::from_slice(&raw)
    }
}

/// Path to entry map for one vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultIndex {
    entries: BTreeMap<String, VaultEntry>,
}

impl VaultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize and encrypt under `password`.
    pub fn to_bytes(&self, password: &[u8], kdf: &KdfParams) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        encrypt_with_password(&json, password, kdf)
    }

    /// Decrypt and parse an index blob.
    ///
    /// # Errors
    /// - `IndexError::WrongPassword` if the blob does not authenticate
    /// - `IndexError::Malformed` if the plaintext is not an index
    pub fn from_bytes(ciphertext: &[u8], password: &[u8]) -> Result<Self> {
        let json = decrypt_with_password(ciphertext, password).map_err(|e| match e {
            Error::Crypto(CryptoError::WrongPasswordOrCorrupt) => {
                Error::Index(IndexError::WrongPassword)
            }
            other => other,
        })?;
        serde_json::from_slice(&json).map_err(|e| IndexError::Malformed(e.to_string()).into())
    }

    pub fn find_entry(&self, path: &VaultPath) -> Option<&VaultEntry> {
        self.entries.get(&path.to_key())
    }

    /// Insert or overwrite a file entry.
    pub fn add_file(
        &mut self,
        path: &VaultPath,
        real_name: impl Into<String>,
        sealed_key_hex: impl Into<String>,
    ) {
        self.entries
            .insert(path.to_key(), VaultEntry::file(real_name, sealed_key_hex));
    }

    /// Insert a folder entry. Existing folders are left alone.
    ///
    /// # Errors
    /// - A file already exists at `path`
    pub fn add_folder(&mut self, path: &VaultPath) -> Result<()> {
        match self.entries.get(&path.to_key()) {
            Some(entry) if entry.is_file() => Err(Error::InvalidInput(format!(
                "'{}' already exists as a file",
                path
            ))),
            Some(_) => Ok(()),
            None => {
                self.entries.insert(path.to_key(), VaultEntry::folder());
                Ok(())
            }
        }
    }

    /// Remove an entry. The content blob is untouched.
    pub fn remove(&mut self, path: &VaultPath) -> Option<VaultEntry> {
        self.entries.remove(&path.to_key())
    }

    /// True if any entry lives below `path`.
    pub fn has_children(&self, path: &VaultPath) -> bool {
        let prefix = format!("{}/", path.to_key());
        self.entries
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    /// All entries, ordered by path.
    pub fn list(&self) -> impl Iterator<Item = (&str, &VaultEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Entries whose path contains `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<(&str, &VaultEntry)> {
        let needle = query.to_lowercase();
        self.list()
            .filter(|(path, _)| path.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
