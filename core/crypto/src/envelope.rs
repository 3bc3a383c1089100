//! Password envelopes.
//!
//! A password envelope is self-describing: everything needed to re-derive the
//! key except the password travels with the ciphertext.
//!
//! # Format
//! ```text
//! version (1) | memory_cost (4, LE) | time_cost (4, LE) | parallelism (4, LE)
//!   | salt (16) | nonce (24) | ciphertext || tag
//! ```
//!
//! A fresh salt and nonce are drawn on every call, so encrypting the same
//! plaintext twice under the same password yields different bytes.

use crate::aead::{self, NONCE_SIZE, TAG_SIZE};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Salt, SALT_LENGTH};
use nexusvault_common::{CryptoError, Result};

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Header size: version + three u32 KDF parameters + salt.
pub const HEADER_SIZE: usize = 1 + 4 * 3 + SALT_LENGTH;

/// Encrypt `plaintext` under a key derived from `password`.
///
/// # Errors
/// - Empty password
/// - Random generation or key derivation failure
pub fn encrypt_with_password(
    plaintext: &[u8],
    password: &[u8],
    params: &KdfParams,
) -> Result<Vec<u8>> {
    let salt = Salt::generate()?;
    let key = derive_key(password, &salt, params)?;
    let sealed = aead::encrypt(key.as_bytes(), plaintext)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + sealed.len());
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&params.memory_cost.to_le_bytes());
    out.extend_from_slice(&params.time_cost.to_le_bytes());
    out.extend_from_slice(&params.parallelism.to_le_bytes());
    out.extend_from_slice(salt.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt an envelope produced by [`encrypt_with_password`].
///
/// # Errors
/// - `WrongPasswordOrCorrupt` for a wrong password, a truncated or tampered
///   envelope, an unknown version or out-of-range KDF parameters. The cases
///   are deliberately indistinguishable.
pub fn decrypt_with_password(ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>> {
    let (params, salt, sealed) = parse_header(ciphertext)?;
    let key = derive_key(password, &salt, &params)?;
    aead::decrypt(key.as_bytes(), sealed)
}

fn parse_header(bytes: &[u8]) -> Result<(KdfParams, Salt, &[u8])> {
    if bytes.len() < HEADER_SIZE + NONCE_SIZE + TAG_SIZE || bytes[0] != ENVELOPE_VERSION {
        return Err(CryptoError::WrongPasswordOrCorrupt.into());
    }

    let read_u32 = |offset: usize| {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    };

    let params = KdfParams {
        memory_cost: read_u32(1),
        time_cost: read_u32(5),
        parallelism: read_u32(9),
    };
    if !params.is_within_bounds() {
        return Err(CryptoError::WrongPasswordOrCorrupt.into());
    }

    let mut salt = [0u8; SALT_LENGTH];
    salt.copy_from_slice(&bytes[13..HEADER_SIZE]);

    Ok((params, Salt::from_bytes(salt), &bytes[HEADER_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexusvault_common::Error;
    use proptest::prelude::*;

    fn params() -> KdfParams {
        KdfParams::light()
    }

    fn is_wrong_password(result: Result<Vec<u8>>) -> bool {
        matches!(result, Err(Error::Crypto(CryptoError::WrongPasswordOrCorrupt)))
    }

    #[test]
    fn test_roundtrip() {
        let sealed = encrypt_with_password(b"index bytes", b"vault-pw", &params()).unwrap();
        let opened = decrypt_with_password(&sealed, b"vault-pw").unwrap();
        assert_eq!(opened, b"index bytes");
    }

    #[test]
    fn test_same_input_different_output() {
        let a = encrypt_with_password(b"same", b"pw", &params()).unwrap();
        let b = encrypt_with_password(b"same", b"pw", &params()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_password() {
        let sealed = encrypt_with_password(b"secret", b"right", &params()).unwrap();
        assert!(is_wrong_password(decrypt_with_password(&sealed, b"wrong")));
    }

    #[test]
    fn test_corruption_looks_like_wrong_password() {
        let mut sealed = encrypt_with_password(b"secret", b"pw", &params()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(is_wrong_password(decrypt_with_password(&sealed, b"pw")));

        assert!(is_wrong_password(decrypt_with_password(b"short", b"pw")));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut sealed = encrypt_with_password(b"secret", b"pw", &params()).unwrap();
        sealed[0] = 99;
        assert!(is_wrong_password(decrypt_with_password(&sealed, b"pw")));
    }

    #[test]
    fn test_oversized_kdf_header_rejected() {
        let mut sealed = encrypt_with_password(b"secret", b"pw", &params()).unwrap();
        sealed[1..5].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(is_wrong_password(decrypt_with_password(&sealed, b"pw")));
    }

    #[test]
    fn test_params_travel_with_envelope() {
        let sealed = encrypt_with_password(b"x", b"pw", &KdfParams::moderate()).unwrap();
        let (decoded, _, _) = parse_header(&sealed).unwrap();
        assert_eq!(decoded, KdfParams::moderate());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512),
                          password in "[ -~]{1,24}") {
            let sealed = encrypt_with_password(&data, password.as_bytes(), &params()).unwrap();
            prop_assert_eq!(decrypt_with_password(&sealed, password.as_bytes()).unwrap(), data);
        }

        #[test]
        fn prop_other_password_fails(w1 in "[a-z]{1,12}", w2 in "[A-Z]{1,12}") {
            let sealed = encrypt_with_password(b"payload", w1.as_bytes(), &params()).unwrap();
            prop_assert!(is_wrong_password(decrypt_with_password(&sealed, w2.as_bytes())));
        }
    }
}
