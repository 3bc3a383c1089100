//! Vault engine for Nexus Vault.
//!
//! This module provides:
//! - The encrypted path index and share index
//! - Connected sessions holding the decrypted state of one vault
//! - Upload, download, delete, list, search and purge
//! - Pointer-based sharing
//!
//! # Architecture
//! The vault sits between the command line and a [`RemoteStore`]. Every
//! mutation is one commit on the remote; reads use the in-memory index and
//! fetch only the blobs they need.
//!
//! [`RemoteStore`]: nexusvault_storage::RemoteStore

pub mod config;
pub mod index;
pub mod operations;
pub mod progress;
pub mod session;
pub mod share;
pub mod shares;

pub use config::{Settings, INDEX_PATH, SHARE_INDEX_PATH};
pub use index::{EntryKind, VaultEntry, VaultIndex};
pub use operations::VaultOperations;
pub use progress::{NoProgress, Progress};
pub use session::VaultSession;
pub use share::{
    download_shared, generate_reference, resolve_share, ResolvedShare, ShareManager,
    ShareString, SharedDownload,
};
pub use shares::{ShareIndex, SharedFileEntry};
pub use nexusvault_crypto::KdfParams;
