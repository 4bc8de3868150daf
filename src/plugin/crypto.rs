//! At-rest ciphers for plugin specifications.
//!
//! Encrypted files carry a text envelope so that plain and encrypted
//! specifications can live side by side in the same package tree:
//! `RHINO-ENC:v1:<base64(nonce || ciphertext || tag)>`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::rand::{SecureRandom, SystemRandom};

use crate::plugin::error::{RegistryError, RegistryResult};
use crate::plugin::traits::{Decryptor, Encryptor};

/// Envelope marker prepended to encrypted specification files
pub const ENVELOPE_PREFIX: &str = "RHINO-ENC:v1:";

/// Identity cipher
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughCipher;

impl Decryptor for PassThroughCipher {
    fn decrypt(&self, bytes: &[u8], _key: &str) -> RegistryResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

impl Encryptor for PassThroughCipher {
    fn encrypt(&self, bytes: &[u8], _key: &str) -> RegistryResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// AES-256-GCM cipher keyed by the SHA-256 digest of the configured key string.
///
/// Decryption only touches enveloped content; anything else passes through.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmCipher;

impl AesGcmCipher {
    fn derive_key(key: &str) -> RegistryResult<LessSafeKey> {
        let hashed = digest(&SHA256, key.as_bytes());
        let unbound = UnboundKey::new(&AES_256_GCM, hashed.as_ref())
            .map_err(|_| RegistryError::internal("failed to create AES-256-GCM key"))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// True when the content carries the encryption envelope
    pub fn is_enveloped(bytes: &[u8]) -> bool {
        bytes.starts_with(ENVELOPE_PREFIX.as_bytes())
    }
}

impl Encryptor for AesGcmCipher {
    fn encrypt(&self, bytes: &[u8], key: &str) -> RegistryResult<Vec<u8>> {
        if key.is_empty() {
            return Ok(bytes.to_vec());
        }

        let sealing_key = Self::derive_key(key)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| RegistryError::internal("failed to generate random nonce"))?;

        let mut in_out = bytes.to_vec();
        sealing_key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce_bytes), Aad::empty(), &mut in_out)
            .map_err(|_| RegistryError::internal("AES-256-GCM encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + in_out.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&in_out);

        Ok(format!("{}{}", ENVELOPE_PREFIX, STANDARD.encode(payload)).into_bytes())
    }
}

impl Decryptor for AesGcmCipher {
    fn decrypt(&self, bytes: &[u8], key: &str) -> RegistryResult<Vec<u8>> {
        if key.is_empty() || !Self::is_enveloped(bytes) {
            return Ok(bytes.to_vec());
        }

        let encoded = std::str::from_utf8(&bytes[ENVELOPE_PREFIX.len()..])
            .map_err(|_| RegistryError::internal("encrypted envelope is not valid UTF-8"))?;
        let payload = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RegistryError::internal(format!("encrypted envelope is not valid base64: {}", e)))?;
        if payload.len() < NONCE_LEN {
            return Err(RegistryError::internal("encrypted envelope is truncated"));
        }

        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| RegistryError::internal("encrypted envelope has an invalid nonce"))?;

        let opening_key = Self::derive_key(key)?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = opening_key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RegistryError::internal("AES-256-GCM decryption failed -- wrong key or corrupted data"))?;

        Ok(plaintext.to_vec())
    }
}
