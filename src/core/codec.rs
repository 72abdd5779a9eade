//! Password-based authenticated encryption for stored credential values.
//!
//! Token layout (base64, url-safe alphabet):
//! `salt[16] || iterations[4, big-endian] || nonce[12] || AES-256-GCM ciphertext+tag`.
//!
//! The key is derived with PBKDF2-HMAC-SHA256 from the bucket password and the
//! embedded salt, so decryption never needs to be told the iteration count.

use crate::constants::{GENERATED_KEY_BYTES, ITERATIONS_LEN, NONCE_LEN, SALT_LEN};
use crate::error::{KeyringError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Upper bound on an embedded iteration count accepted at decryption.
/// Keeps a tampered prefix from stalling the caller in key derivation.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

const HEADER_LEN: usize = SALT_LEN + ITERATIONS_LEN;

#[derive(Debug, Clone, Copy)]
pub struct Codec {
    iterations: u32,
}

impl Codec {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.clamp(1, MAX_KDF_ITERATIONS),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Encrypt `plaintext` under `password`, returning a text-safe token.
    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = derive_key(password, &salt, self.iterations);

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| KeyringError::EncryptionFailure)?;

        let mut raw = Vec::with_capacity(HEADER_LEN + NONCE_LEN + sealed.len());
        raw.extend_from_slice(&salt);
        raw.extend_from_slice(&self.iterations.to_be_bytes());
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&sealed);
        Ok(URL_SAFE.encode(raw))
    }

    /// Encrypt under a freshly generated bucket key; returns `(token, key)`.
    pub fn encrypt_with_generated_key(&self, plaintext: &[u8]) -> Result<(String, String)> {
        let key = generate_key();
        let token = self.encrypt(plaintext, &key)?;
        Ok((token, key))
    }

    /// Authenticate and decrypt `token` with `password`.
    ///
    /// Malformed encoding, a truncated token, a wrong password and a tampered
    /// ciphertext all surface as [`KeyringError::AuthenticationFailure`].
    pub fn decrypt(token: &str, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let raw = URL_SAFE
            .decode(token.trim())
            .map_err(|_| KeyringError::AuthenticationFailure)?;
        if raw.len() < HEADER_LEN + NONCE_LEN {
            return Err(KeyringError::AuthenticationFailure);
        }

        let (salt, rest) = raw.split_at(SALT_LEN);
        let (iter_bytes, rest) = rest.split_at(ITERATIONS_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let mut iter_buf = [0u8; ITERATIONS_LEN];
        iter_buf.copy_from_slice(iter_bytes);
        let iterations = u32::from_be_bytes(iter_buf);
        if iterations == 0 || iterations > MAX_KDF_ITERATIONS {
            return Err(KeyringError::AuthenticationFailure);
        }

        let key = derive_key(password, salt, iterations);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|_| KeyringError::AuthenticationFailure)
    }
}

/// Generate a high-entropy bucket key: 32 random bytes, url-safe base64.
pub fn generate_key() -> String {
    let mut bytes = Zeroizing::new([0u8; GENERATED_KEY_BYTES]);
    OsRng.fill_bytes(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(&bytes[..])
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
    key
}
