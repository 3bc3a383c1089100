//! Common error types for Nexus Vault.
//!
//! Wrong-password and corrupted-data failures share one message; nothing in
//! the display text tells them apart.

use thiserror::Error;

/// Failures raised by the crypto engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Authentication failed: the password or key is wrong, or the data is corrupt.
    #[error("decryption failed: check your password")]
    WrongPasswordOrCorrupt,

    /// The system random number generator failed.
    #[error("random number generation failed: {0}")]
    Rng(String),

    /// Key derivation could not run with the given parameters.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// A key had the wrong length or encoding.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Encryption itself failed.
    #[error("encryption failed: {0}")]
    Encryption(String),
}

/// Failures raised while loading an encrypted index blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// The blob did not authenticate under the supplied password.
    #[error("failed to decrypt index (check your password)")]
    WrongPassword,

    /// The blob decrypted but its content did not parse.
    #[error("malformed index: {0}")]
    Malformed(String),
}

/// Failures raised by the share manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShareError {
    /// The share string is not `user:reference:password[:base64(name)]`.
    #[error("invalid share string: {0}")]
    BadFormat(String),

    /// The share pointer did not decrypt under the share password.
    #[error("decryption failed: invalid share password")]
    BadPassword,

    /// The vault path to share does not exist.
    #[error("could not find file in vault: {0}")]
    NotFound(String),

    /// The vault path to share is a folder.
    #[error("'{0}' is a directory, you can only share individual files")]
    IsFolder(String),
}

/// Top-level error type for Nexus Vault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Cryptographic operation failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Index could not be decrypted or parsed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Sharing failed.
    #[error(transparent)]
    Share(#[from] ShareError),

    /// Path absent from the index, or object missing on the remote.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Clone, fetch or push failed for any reason other than a missing object.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote head moved since it was last observed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// True for both flavours of missing data: index path or remote object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Share(ShareError::NotFound(_)))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
