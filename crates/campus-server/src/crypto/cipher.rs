//! Sealing and opening of single string values under AES-256-GCM-SIV.
//!
//! A fresh random nonce is drawn per call, so one plaintext sealed twice
//! gives two different strings. Anything that must compare equal across
//! writes (the unique email) uses [`Cipher::blind_index`] instead.
//! GCM-SIV tolerates an accidental nonce repeat; plain GCM would not.

use std::{fmt, str::FromStr};

use aes_gcm_siv::{
    aead::{Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

pub const NONCE_LEN: usize = 12;

/// Leading segment of every sealed value.
pub const VERSION_PREFIX: &str = "v1";

const AEAD_KEY_LABEL: &[u8] = b"campus-entry/field-encryption/v1";
const INDEX_KEY_LABEL: &[u8] = b"campus-entry/blind-index/v1";

type HmacSha256 = Hmac<Sha256>;

/// A sealed value split into its nonce and ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte tag appended.
    pub ciphertext: Vec<u8>,
}

impl EncryptedField {
    /// The `v1.<nonce>.<ciphertext>` wire form.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }
}

impl FromStr for EncryptedField {
    type Err = CipherError;

    /// Split a `v1.<nonce>.<ciphertext>` string. Anything else is
    /// [`CipherError::InvalidFormat`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 || parts[0] != VERSION_PREFIX {
            return Err(CipherError::InvalidFormat);
        }
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| CipherError::InvalidFormat)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::InvalidFormat);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&nonce_bytes);

        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| CipherError::InvalidFormat)?;

        Ok(Self { nonce, ciphertext })
    }
}

#[derive(Debug, Error)]
pub enum CipherError {
    /// The configured secret is empty.
    #[error("cipher secret must not be empty")]
    EmptySecret,

    /// Key derivation produced unusable key material.
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption or decryption failed (wrong key or tampered data).
    #[error("sealed value did not authenticate")]
    AeadFailure,

    /// Not a `v1.<nonce>.<ciphertext>` string.
    #[error("malformed sealed value")]
    InvalidFormat,

    /// Decryption succeeded but the plaintext is not UTF-8.
    #[error("decrypted value is not valid UTF-8")]
    InvalidUtf8,
}

/// String cipher keyed from a single shared secret.
///
/// Two independent keys are derived from the secret with HMAC-SHA256: one
/// for AES-256-GCM-SIV and one for the blind index.
#[derive(Clone)]
pub struct Cipher {
    aead: Aes256GcmSiv,
    index_key: Box<[u8; KEY_LEN]>,
}

impl Cipher {
    /// Derive a [`Cipher`] from the configured shared secret.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::EmptySecret`] if `secret` is empty.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        if secret.is_empty() {
            return Err(CipherError::EmptySecret);
        }
        let mut aead_key = derive_key(secret.as_bytes(), AEAD_KEY_LABEL)?;
        let aead = build_cipher(&aead_key[..]);
        aead_key.iter_mut().for_each(|b| *b = 0);
        let aead = aead?;
        let index_key = derive_key(secret.as_bytes(), INDEX_KEY_LABEL)?;
        Ok(Self { aead, index_key })
    }

    /// Encrypt a UTF-8 string, returning its `v1.` string representation.
    ///
    /// A random 96-bit nonce is generated per call via the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] on an internal AEAD error (should be
    /// unreachable with a valid key and nonce).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        use aes_gcm_siv::aead::rand_core::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::AeadFailure)?;

        Ok(EncryptedField {
            nonce: nonce_bytes,
            ciphertext,
        }
        .to_string_repr())
    }

    /// Decrypt a `v1.` string produced by [`Cipher::encrypt`] under the same secret.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] for malformed input,
    /// [`CipherError::AeadFailure`] if authentication fails (foreign key or
    /// tampered data), and [`CipherError::InvalidUtf8`] if the plaintext is not text.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let field: EncryptedField = ciphertext.parse()?;
        let nonce = Nonce::from_slice(&field.nonce);
        let bytes = self
            .aead
            .decrypt(nonce, field.ciphertext.as_ref())
            .map_err(|_| CipherError::AeadFailure)?;
        String::from_utf8(bytes).map_err(|_| CipherError::InvalidUtf8)
    }

    /// Deterministic keyed digest of `value`, used to enforce uniqueness on
    /// fields whose stored form is randomised.
    pub fn blind_index(&self, value: &str) -> Result<String, CipherError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.index_key[..])
            .map_err(|_| CipherError::InvalidKeyLength)?;
        mac.update(value.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

impl Drop for Cipher {
    fn drop(&mut self) {
        // Zero the index key on drop; the AEAD key schedule is owned by the aes crate.
        self.index_key.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // No key material, in any build.
        f.write_str("Cipher([REDACTED])")
    }
}

fn derive_key(secret: &[u8], label: &[u8]) -> Result<Box<[u8; KEY_LEN]>, CipherError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| CipherError::InvalidKeyLength)?;
    mac.update(label);
    let digest = mac.finalize().into_bytes();
    if digest.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    let mut key = Box::new([0u8; KEY_LEN]);
    key.copy_from_slice(&digest);
    Ok(key)
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}
