//! The owner's record of issued shares.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nexusvault_common::{CryptoError, Error, IndexError, Result};
use nexusvault_crypto::{decrypt_with_password, encrypt_with_password, KdfParams};

/// One issued share.
///
/// The share password is kept in plaintext here; the whole list is only
/// ever stored encrypted under the vault password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedFileEntry {
    /// Vault path that was shared.
    pub name: String,
    pub reference: String,
    pub password: String,
    pub shared_at: DateTime<Utc>,
    /// Vault path at the time of sharing.
    pub original_path: String,
}

/// Append-only list of issued shares, in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareIndex {
    entries: Vec<SharedFileEntry>,
}

impl ShareIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: SharedFileEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SharedFileEntry] {
        &self.entries
    }

    pub fn find_reference(&self, reference: &str) -> Option<&SharedFileEntry> {
        self.entries.iter().find(|e| e.reference == reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize and encrypt under the vault password.
    pub fn to_bytes(&self, password: &[u8], kdf: &KdfParams) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))?;
        encrypt_with_password(&json, password, kdf)
    }

    /// Decrypt and parse a share index blob.
    ///
    /// Errors match [`crate::VaultIndex::from_bytes`].
    pub fn from_bytes(ciphertext: &[u8], password: &[u8]) -> Result<Self> {
        let json = decrypt_with_password(ciphertext, password).map_err(|e| match e {
            Error::Crypto(CryptoError::WrongPasswordOrCorrupt) => {
                Error::Index(IndexError::WrongPassword)
            }
            other => other,
        })?;
        serde_json::from_slice(&json).map_err(|e| IndexError::Malformed(e.to_string()).into())
    }
}
