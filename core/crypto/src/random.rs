//! Random keys and identifiers drawn from the operating system CSPRNG.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::keys::{FileKey, KEY_LENGTH};
use nexusvault_common::{CryptoError, Error, Result};

/// Alphabet for share references.
pub const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Largest multiple of 62 that fits in a byte; bytes at or above it are
/// rejected so every symbol is equally likely.
const BASE62_REJECTION_LIMIT: u8 = 248;

/// Fill `buf` from the OS random source.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::Rng(e.to_string()).into())
}

/// Generate a fresh random per-file key.
pub fn generate_file_key() -> Result<FileKey> {
    let mut key = [0u8; KEY_LENGTH];
    fill_random(&mut key)?;
    Ok(FileKey::from_bytes(key))
}

/// Generate an opaque storage name of `byte_length` random bytes, hex encoded.
///
/// The result is `2 * byte_length` characters long.
pub fn generate_random_name(byte_length: usize) -> Result<String> {
    if byte_length == 0 {
        return Err(Error::InvalidInput(
            "Storage name length must be positive".to_string(),
        ));
    }
    let mut bytes = vec![0u8; byte_length];
    fill_random(&mut bytes)?;
    Ok(hex::encode(bytes))
}

/// Generate a uniformly random base-62 string of `length` characters.
pub fn random_base62(length: usize) -> Result<String> {
    if length == 0 {
        return Err(Error::InvalidInput(
            "Reference length must be positive".to_string(),
        ));
    }

    let mut out = String::with_capacity(length);
    let mut pool = [0u8; 64];
    while out.len() < length {
        fill_random(&mut pool)?;
        for byte in pool {
            if byte >= BASE62_REJECTION_LIMIT {
                continue;
            }
            out.push(BASE62_ALPHABET[(byte % 62) as usize] as char);
            if out.len() == length {
                break;
            }
        }
    }
    Ok(out)
}
