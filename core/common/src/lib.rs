//! Common utilities and types shared across Nexus Vault crates.
//!
//! This module provides the error taxonomy and the small value types that
//! every other crate in the workspace builds on.

pub mod error;
pub mod types;

pub use error::{CryptoError, Error, IndexError, Result, ShareError};
pub use types::{SensitiveBytes, VaultPath};
