//! Password-based envelope encryption for private key material
//!
//! The envelope layout is a fixed format contract shared by `seal` and
//! `open`: `version(1) || salt(16) || nonce(12) || ciphertext`, the whole
//! thing Base64-encoded for storage. Changing any constant below breaks
//! every previously persisted wallet record; bump [`ENVELOPE_VERSION`] and
//! keep a decode path for the old layout instead.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};

/// PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ITERATIONS: u32 = 10_000;
/// Derived symmetric key length in bytes (AES-256)
pub const DERIVED_KEY_LEN: usize = 32;
/// Random salt length in bytes
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce length in bytes
pub const NONCE_LEN: usize = 12;
/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 1;

const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Encrypt `plaintext` under a key derived from `password` with a fresh
/// random salt and nonce. Returns the Base64 envelope string.
pub fn seal(plaintext: &str, password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| Error::EntropyUnavailable(e.to_string()))?;

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| Error::Internal("envelope encryption failed".into()))?;

    let mut envelope = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&salt);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(envelope))
}

/// Decrypt an envelope produced by [`seal`].
///
/// Every failure mode (bad Base64, truncation, unknown version, wrong
/// password, tampered ciphertext) collapses into [`Error::Decryption`] so
/// the caller cannot be used as a padding or corruption oracle.
pub fn open(envelope: &str, password: &str) -> Result<Zeroizing<String>> {
    let bytes = BASE64.decode(envelope.trim()).map_err(|_| Error::Decryption)?;
    if bytes.len() <= HEADER_LEN || bytes[0] != ENVELOPE_VERSION {
        return Err(Error::Decryption);
    }
    let salt = &bytes[1..1 + SALT_LEN];
    let nonce = &bytes[1 + SALT_LEN..HEADER_LEN];
    let ciphertext = &bytes[HEADER_LEN..];

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
    // The GCM tag check is what rejects a wrong password
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::Decryption)?;

    match String::from_utf8(plaintext) {
        Ok(s) => Ok(Zeroizing::new(s)),
        Err(e) => {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            Err(Error::Decryption)
        }
    }
}

/// Stretch a password into an AES key. CPU-bound: roughly 10ms of PBKDF2
/// per call, which is the point.
fn derive_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; DERIVED_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        key.as_mut_slice(),
    );
    key
}
