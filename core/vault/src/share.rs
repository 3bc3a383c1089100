//! Pointer-based file sharing.
//!
//! Sharing never copies content. The owner publishes a small pointer at
//! `shared/{reference}` holding the storage name and the raw file key,
//! encrypted under a share password. Anyone with the share string can read
//! the pointer and then the content blob; the vault password is never
//! involved on the recipient side.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::{shared_pointer_path, SHARE_INDEX_PATH};
use crate::progress::{Progress, NO_PROGRESS};
use crate::session::VaultSession;
use crate::shares::SharedFileEntry;
use nexusvault_common::{CryptoError, Error, Result, SensitiveBytes, ShareError, VaultPath};
use nexusvault_crypto::{
    decrypt_with_key, decrypt_with_password, encrypt_with_password, random_base62, FileKey,
};
use nexusvault_storage::{Changeset, RemoteStore};

const SHARE_STRING_HELP: &str =
    "expected 'username:reference:password' or 'username:reference:password:base64(filename)'";

/// Generate a share reference of `length` base-62 characters.
pub fn generate_reference(length: usize) -> Result<String> {
    random_base62(length)
}

/// Decrypted content of `shared/{reference}`.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SharePointer {
    #[serde(rename = "storageID")]
    storage_id: String,
    #[serde(rename = "fileKey")]
    file_key: String,
}

/// Everything a recipient needs to fetch one shared file.
///
/// Current strings have four `:`-separated parts; the legacy form omits the
/// base64 file name.
#[derive(Clone)]
pub struct ShareString {
    pub owner: String,
    pub reference: String,
    password: SensitiveBytes,
    pub filename: Option<String>,
}

impl ShareString {
    pub fn new(
        owner: impl Into<String>,
        reference: impl Into<String>,
        password: &str,
        filename: Option<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            reference: reference.into(),
            password: SensitiveBytes::from(password),
            filename,
        }
    }

    /// Parse a 3- or 4-part share string.
    ///
    /// # Errors
    /// - `ShareError::BadFormat` for any other shape, empty parts, a
    ///   reference outside base-62, or an undecodable file name
    pub fn parse(input: &str) -> Result<Self> {
        let parts: Vec<&str> = input.trim().split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(ShareError::BadFormat(SHARE_STRING_HELP.to_string()).into());
        }

        let (owner, reference, password) = (parts[0], parts[1], parts[2]);
        if owner.is_empty() || password.is_empty() || reference.is_empty() {
            return Err(ShareError::BadFormat(SHARE_STRING_HELP.to_string()).into());
        }
        if owner.contains('/') {
            return Err(ShareError::BadFormat(format!("invalid username: {}", owner)).into());
        }
        if !reference.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ShareError::BadFormat(format!("invalid reference: {}", reference)).into());
        }

        let filename = parts.get(3).map(|encoded| decode_filename(encoded)).transpose()?;

        Ok(Self::new(owner, reference, password, filename))
    }

    pub fn password(&self) -> &[u8] {
        self.password.as_bytes()
    }
}

fn decode_filename(encoded: &str) -> Result<String> {
    let bad = || ShareError::BadFormat("invalid filename encoding in share string".to_string());
    let bytes = STANDARD.decode(encoded).map_err(|_| bad())?;
    let name = String::from_utf8(bytes).map_err(|_| bad())?;
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ShareError::BadFormat(format!("invalid filename: {:?}", name)).into());
    }
    Ok(name)
}

impl FromStr for ShareString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ShareString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.owner,
            self.reference,
            String::from_utf8_lossy(self.password.as_bytes())
        )?;
        if let Some(name) = &self.filename {
            write!(f, ":{}", STANDARD.encode(name.as_bytes()))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShareString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareString")
            .field("owner", &self.owner)
            .field("reference", &self.reference)
            .field("password", &"[REDACTED]")
            .field("filename", &self.filename)
            .finish()
    }
}

/// A resolved share: where the content lives and the key that opens it.
#[derive(Debug)]
pub struct ResolvedShare {
    pub storage_id: String,
    pub key: FileKey,
}

/// Content fetched through a share string.
#[derive(Debug)]
pub struct SharedDownload {
    /// File name carried by the share string, if any.
    pub filename: Option<String>,
    pub content: Vec<u8>,
}

/// Issues shares from a connected session.
pub struct ShareManager<'a> {
    session: &'a mut VaultSession,
    progress: &'a dyn Progress,
}

impl<'a> ShareManager<'a> {
    pub fn new(session: &'a mut VaultSession) -> Self {
        Self {
            session,
            progress: &NO_PROGRESS,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }

    /// Share the file at `path` under `share_password`.
    ///
    /// # Postconditions
    /// - One commit holding the new pointer and the updated share index
    /// - The returned string is in the 4-part form
    ///
    /// # Errors
    /// - `ShareError::NotFound` / `ShareError::IsFolder` for the path
    /// - `Error::InvalidInput` for an empty share password or one containing ':'
    /// - Publish failure
    pub async fn share(&mut self, path: &VaultPath, share_password: &str) -> Result<ShareString> {
        if share_password.is_empty() || share_password.contains(':') {
            return Err(Error::InvalidInput(
                "Share password must be non-empty and must not contain ':'".to_string(),
            ));
        }
        let settings = self.session.settings().clone();

        self.progress.step(1, 5, "Locating file in vault...");
        let entry = self
            .session
            .index()
            .find_entry(path)
            .cloned()
            .ok_or_else(|| ShareError::NotFound(path.to_string()))?;
        if entry.is_folder() {
            return Err(ShareError::IsFolder(path.to_string()).into());
        }
        self.progress.done("File located");

        self.progress.step(2, 5, "Generating share reference...");
        let mut shares = self.session.shares().await?.clone();
        let reference = loop {
            let candidate = generate_reference(settings.share_reference_length)?;
            if shares.find_reference(&candidate).is_none() {
                break candidate;
            }
        };
        self.progress.done("Share reference generated");

        self.progress.step(3, 5, "Preparing file key...");
        let key = entry.open_key(self.session.password())?;
        self.progress.done("File key ready");

        self.progress.step(4, 5, "Encrypting share pointer...");
        let pointer = SharePointer {
            storage_id: entry.real_name.clone(),
            file_key: key.to_hex(),
        };
        let mut pointer_json =
            serde_json::to_vec(&pointer).map_err(|e| Error::Serialization(e.to_string()))?;
        let sealed = encrypt_with_password(&pointer_json, share_password.as_bytes(), &settings.kdf);
        pointer_json.zeroize();
        let sealed = sealed?;

        let filename = path.name().map(str::to_string);
        shares.add_entry(SharedFileEntry {
            name: path.to_key(),
            reference: reference.clone(),
            password: share_password.to_string(),
            shared_at: Utc::now(),
            original_path: path.to_key(),
        });

        let mut changes = Changeset::new();
        changes.write(shared_pointer_path(&reference), sealed)?;
        changes.write(
            SHARE_INDEX_PATH,
            shares.to_bytes(self.session.password(), &settings.kdf)?,
        )?;
        self.progress.done("Share pointer encrypted");

        self.progress.step(5, 5, "Uploading share...");
        self.session.publish(changes, "Share").await?;
        self.session.commit_shares(shares);
        self.progress.done("Share uploaded");

        info!(reference = %reference, "File shared");
        Ok(ShareString::new(
            self.session.username(),
            reference,
            share_password,
            filename,
        ))
    }

    /// Shares issued from this vault, oldest first.
    pub async fn list_shares(&mut self) -> Result<Vec<SharedFileEntry>> {
        Ok(self.session.shares().await?.entries().to_vec())
    }
}

/// Fetch and open the pointer named by `share`.
///
/// `remote` must be bound to the share owner's repository; no credential is
/// needed.
///
/// # Errors
/// - `Error::NotFound` if no pointer exists for the reference
/// - `ShareError::BadPassword` if the pointer does not open
/// - `ShareError::BadFormat` if it opens but is not a pointer
pub async fn resolve_share(share: &ShareString, remote: &dyn RemoteStore) -> Result<ResolvedShare> {
    debug!(owner = %share.owner, reference = %share.reference, "Resolving share");
    let sealed = remote
        .fetch_blob(&shared_pointer_path(&share.reference))
        .await?;

    let mut json = decrypt_with_password(&sealed, share.password()).map_err(|e| match e {
        Error::Crypto(CryptoError::WrongPasswordOrCorrupt) => Error::Share(ShareError::BadPassword),
        other => other,
    })?;
    let parsed: std::result::Result<SharePointer, _> = serde_json::from_slice(&json);
    json.zeroize();
    let pointer =
        parsed.map_err(|_| ShareError::BadFormat("invalid share pointer".to_string()))?;

    Ok(ResolvedShare {
        storage_id: pointer.storage_id.clone(),
        key: FileKey::from_hex(&pointer.file_key)?,
    })
}

/// Resolve `share` and download the file it points to.
///
/// # Errors
/// - Everything [`resolve_share`] returns
/// - `Error::NotFound` if the content blob is gone
pub async fn download_shared(share: &ShareString, remote: &dyn RemoteStore) -> Result<SharedDownload> {
    let resolved = resolve_share(share, remote).await?;
    let ciphertext = remote.fetch_blob(&resolved.storage_id).await?;
    let content = decrypt_with_key(&ciphertext, &resolved.key)?;

    info!(reference = %share.reference, size = content.len(), "Shared file downloaded");
    Ok(SharedDownload {
        filename: share.filename.clone(),
        content,
    })
}
