#![forbid(unsafe_code)]

use super::Cipher;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;
const KEY_SIZE: usize = 32;

/// Argon2id cost parameters for turning the sync password into a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// XChaCha20-Poly1305 keyed by an Argon2id-stretched password.
///
/// Output layout: `salt (16) || nonce (24) || ciphertext+tag`. Every seal draws a fresh salt and
/// nonce, so the same snapshot never encrypts to the same bytes twice.
#[derive(Clone)]
pub struct PasswordCipher {
    password: Vec<u8>,
    params: KdfParams,
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher")
            .field("password", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

impl PasswordCipher {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into().into_bytes(),
            params: KdfParams::default(),
        }
    }

    pub fn with_params(mut self, params: KdfParams) -> Self {
        self.params = params;
        self
    }

    fn derive_key(&self, salt: &[u8]) -> Result<[u8; KEY_SIZE], String> {
        let params = Params::new(
            self.params.m_cost,
            self.params.t_cost,
            self.params.p_cost,
            Some(KEY_SIZE),
        )
        .map_err(|err| format!("invalid key derivation parameters: {err}"))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut key = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(&self.password, salt, &mut key)
            .map_err(|err| format!("key derivation failed: {err}"))?;
        Ok(key)
    }
}

impl Cipher for PasswordCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, String> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut salt).map_err(|err| format!("entropy unavailable: {err}"))?;
        getrandom::getrandom(&mut nonce).map_err(|err| format!("entropy unavailable: {err}"))?;

        let key = self.derive_key(&salt)?;
        let cipher = XChaCha20Poly1305::new((&key).into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| "AEAD encryption failed".to_string())?;

        let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        if data.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err("ciphertext is too short".to_string());
        }
        let (salt, rest) = data.split_at(SALT_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let key = self.derive_key(salt)?;
        let cipher = XChaCha20Poly1305::new((&key).into());
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| "authentication failed (wrong key or corrupted data)".to_string())
    }
}
