//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    XChaCha20Poly1305,
};

use crate::keys::{FileKey, KEY_LENGTH};
use crate::random::fill_random;
use nexusvault_common::{CryptoError, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated
/// - The ciphertext length is plaintext length + TAG_SIZE + NONCE_SIZE
///
/// # Errors
/// - Returns error if key length is incorrect
/// - Returns error if the random nonce cannot be generated
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    check_key_length(key)?;

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(GenericArray::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    // Prepend nonce to ciphertext
    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt ciphertext using XChaCha20-Poly1305.
///
/// # Errors
/// - Returns error if key length is incorrect
/// - `WrongPasswordOrCorrupt` if the ciphertext is truncated or fails
///   authentication
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_key_length(key)?;

    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::WrongPasswordOrCorrupt.into());
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(GenericArray::from_slice(nonce_bytes), encrypted)
        .map_err(|_| CryptoError::WrongPasswordOrCorrupt.into())
}

/// Encrypt file content under its per-file key.
pub fn encrypt_with_key(plaintext: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    encrypt(key.as_bytes(), plaintext)
}

/// Decrypt file content with its per-file key.
pub fn decrypt_with_key(ciphertext: &[u8], key: &FileKey) -> Result<Vec<u8>> {
    decrypt(key.as_bytes(), ciphertext)
}

fn check_key_length(key: &[u8]) -> Result<()> {
    if key.len() != KEY_LENGTH {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            KEY_LENGTH,
            key.len()
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexusvault_common::Error;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, World!";

        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_ciphertext_size() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Test message";

        let ciphertext = encrypt(&key, plaintext).unwrap();

        assert_eq!(ciphertext.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_different_nonce_each_time() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Same plaintext";

        let ct1 = encrypt(&key, plaintext).unwrap();
        let ct2 = encrypt(&key, plaintext).unwrap();

        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = FileKey::from_bytes([1u8; KEY_LENGTH]);
        let key2 = FileKey::from_bytes([2u8; KEY_LENGTH]);

        let ciphertext = encrypt_with_key(b"Secret data", &key1).unwrap();
        let result = decrypt_with_key(&ciphertext, &key2);

        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::WrongPasswordOrCorrupt))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];

        let mut ciphertext = encrypt(&key, b"Important data").unwrap();
        ciphertext[NONCE_SIZE + 5] ^= 0xFF;

        assert!(decrypt(&key, &ciphertext).is_err());
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_SIZE]),
            Err(Error::Crypto(CryptoError::WrongPasswordOrCorrupt))
        ));
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(encrypt(&[0u8; 16], b"data").is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = FileKey::from_bytes([42u8; KEY_LENGTH]);

        let ciphertext = encrypt_with_key(b"", &key).unwrap();
        let decrypted = decrypt_with_key(&ciphertext, &key).unwrap();

        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![0xABu8; 1_000_000]; // 1 MB

        let ciphertext = encrypt(&key, &plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();

        assert_eq!(decrypted, plaintext);
    }
}
