//! Session keys, key wrapping and file decryption
//!
//! Clients submit an RSA public key as DER (PKCS#1 `RSAPublicKey` or
//! SubjectPublicKeyInfo) zero-padded into a fixed 160-byte field. The server
//! answers with a fresh AES-256 session key wrapped under RSA-OAEP (SHA-1),
//! and file packets arrive encrypted with AES-256-CBC, PKCS#7 padding and an
//! all-zero IV.

use std::fmt;

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core_06::{OsRng, RngCore};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::Sha1;
use vault_common::protocol::SESSION_KEY_SIZE;

/// AES block size, also the IV length
const AES_BLOCK_SIZE: usize = 16;

/// The protocol fixes the IV at all zeros
///
/// Every file under one session key therefore leaks shared plaintext
/// prefixes. Changing it breaks existing clients.
const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// ASN.1 SEQUENCE tag that starts every DER-encoded public key
const DER_SEQUENCE_TAG: u8 = 0x30;

/// Errors raised by key handling and file decryption
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("failed to wrap session key: {0}")]
    Wrap(String),

    #[error("ciphertext could not be decrypted with the session key")]
    Decrypt,
}

/// Symmetric key shared with one client for the lifetime of a session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_SIZE]);

impl SessionKey {
    /// Generate a new key from the operating system RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; SESSION_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Length of the DER structure at the start of `field`, including its header
///
/// Only definite short and long forms up to two length bytes are accepted,
/// which covers every RSA key that fits the 160-byte field.
fn der_length(field: &[u8]) -> Result<usize, CryptoError> {
    let invalid = |msg: &str| CryptoError::InvalidPublicKey(msg.to_string());

    if field.first() != Some(&DER_SEQUENCE_TAG) {
        return Err(invalid("missing DER sequence tag"));
    }
    let first = *field.get(1).ok_or_else(|| invalid("truncated DER header"))?;
    let (header, body) = match first {
        len @ 0x00..=0x7f => (2, len as usize),
        0x81 => {
            let len = *field.get(2).ok_or_else(|| invalid("truncated DER header"))?;
            (3, len as usize)
        }
        0x82 => {
            let hi = *field.get(2).ok_or_else(|| invalid("truncated DER header"))?;
            let lo = *field.get(3).ok_or_else(|| invalid("truncated DER header"))?;
            (4, u16::from_be_bytes([hi, lo]) as usize)
        }
        _ => return Err(invalid("unsupported DER length encoding")),
    };

    let total = header + body;
    if total > field.len() {
        return Err(invalid("DER length exceeds the key field"));
    }
    Ok(total)
}

/// Parse a zero-padded DER public key field
///
/// # Errors
///
/// Returns `CryptoError::InvalidPublicKey` if the field holds neither a
/// SubjectPublicKeyInfo nor a PKCS#1 RSA public key.
pub fn parse_public_key(field: &[u8]) -> Result<RsaPublicKey, CryptoError> {
    let der = &field[..der_length(field)?];
    RsaPublicKey::from_public_key_der(der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Encrypt `session_key` for the holder of `public_key` using RSA-OAEP (SHA-1)
///
/// # Errors
///
/// Returns an error if the key cannot be parsed or is too small for OAEP.
pub fn wrap_session_key(public_key: &[u8], session_key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    let key = parse_public_key(public_key)?;
    key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), session_key.as_bytes())
        .map_err(|e| CryptoError::Wrap(e.to_string()))
}

/// Decrypt a reassembled file with AES-256-CBC and strip PKCS#7 padding
///
/// # Errors
///
/// Returns `CryptoError::Decrypt` if the ciphertext is not block aligned or
/// the padding is invalid (usually a wrong session key).
pub fn decrypt_file(session_key: &SessionKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(session_key.as_bytes(), &ZERO_IV)
        .map_err(|_| CryptoError::Decrypt)?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decrypt)
}

/// Encrypt a file the way clients do before splitting it into packets
///
/// # Errors
///
/// Only fails if the key length is wrong, which the type rules out in practice.
pub fn encrypt_file(session_key: &SessionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(session_key.as_bytes(), &ZERO_IV)
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::RsaPrivateKey;
    use rsa::pkcs1::EncodeRsaPublicKey;
    use rsa::pkcs8::EncodePublicKey;
    use std::sync::OnceLock;
    use vault_common::protocol::PUBLIC_KEY_FIELD_SIZE;

    fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).unwrap())
    }

    fn padded(der: &[u8]) -> Vec<u8> {
        let mut field = der.to_vec();
        field.resize(PUBLIC_KEY_FIELD_SIZE, 0);
        field
    }

    #[test]
    fn test_wrap_and_unwrap_pkcs1() {
        let private = test_key();
        let der = private.to_public_key().to_pkcs1_der().unwrap();
        let field = padded(der.as_bytes());

        let session = SessionKey::generate();
        let wrapped = wrap_session_key(&field, &session).unwrap();
        assert_eq!(wrapped.len(), 128);

        let unwrapped = private.decrypt(Oaep::new::<Sha1>(), &wrapped).unwrap();
        assert_eq!(unwrapped, session.as_bytes());
    }

    #[test]
    fn test_parse_spki_when_it_fits() {
        let private = test_key();
        let der = private.to_public_key().to_public_key_der().unwrap();
        // A 1024-bit SPKI is 162 bytes, so exercise the parser directly
        let parsed = parse_public_key(der.as_bytes()).unwrap();
        assert_eq!(parsed, private.to_public_key());
    }

    #[test]
    fn test_reject_garbage_key() {
        assert!(matches!(
            parse_public_key(&[0u8; PUBLIC_KEY_FIELD_SIZE]),
            Err(CryptoError::InvalidPublicKey(_))
        ));
        let mut field = vec![0x30, 0x82, 0x01, 0x00];
        field.resize(PUBLIC_KEY_FIELD_SIZE, 0);
        assert!(matches!(
            parse_public_key(&field),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let key = SessionKey::generate();
        let plaintext = b"quarterly report contents".repeat(40);
        let ciphertext = encrypt_file(&key, &plaintext).unwrap();
        assert_eq!(ciphertext.len() % AES_BLOCK_SIZE, 0);
        assert_eq!(decrypt_file(&key, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_or_length_fails() {
        let key = SessionKey::generate();
        let ciphertext = encrypt_file(&key, b"hello world").unwrap();
        assert!(matches!(
            decrypt_file(&key, &ciphertext[..ciphertext.len() - 1]),
            Err(CryptoError::Decrypt)
        ));
        assert!(matches!(decrypt_file(&key, &[]), Err(CryptoError::Decrypt)));
    }

    #[test]
    fn test_session_keys_are_fresh() {
        assert_ne!(SessionKey::generate(), SessionKey::generate());
        assert_eq!(format!("{:?}", SessionKey::generate()), "SessionKey(..)");
    }
}
