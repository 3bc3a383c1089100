//! Cryptographic primitives for Nexus Vault.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Password envelopes that carry their own salt, nonce and KDF parameters
//! - Random per-file keys, storage names and share references
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged
//! - A wrong password and corrupted data fail with the same error

pub mod aead;
pub mod envelope;
pub mod kdf;
pub mod keys;
pub mod random;

pub use aead::{decrypt_with_key, encrypt_with_key};
pub use envelope::{decrypt_with_password, encrypt_with_password};
pub use kdf::{derive_key, KdfParams};
pub use keys::{FileKey, PasswordKey, Salt, KEY_LENGTH};
pub use random::{generate_file_key, generate_random_name, random_base62};
