//! Binary envelope for a single encrypted message.
//!
//! Layout:
//! ```text
//! SALT (16) | IV (12) | CIPHERTEXT + TAG (variable)
//! ```

use super::{IV_LEN, SALT_LEN, aead, kdf};
use crate::error::{PhantomError, Result};
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Shortest byte sequence that can be split into salt and IV.
    pub const MIN_LEN: usize = SALT_LEN + IV_LEN;

    pub fn new(salt: [u8; SALT_LEN], iv: [u8; IV_LEN], ciphertext: Vec<u8>) -> Self {
        Self {
            salt,
            iv,
            ciphertext,
        }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Size of [`Envelope::to_bytes`] output.
    pub fn byte_len(&self) -> usize {
        Self::MIN_LEN + self.ciphertext.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.byte_len());

        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.iv);
        buf.extend_from_slice(&self.ciphertext);

        buf
    }

    /// Splits raw bytes into salt, IV and ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`PhantomError::MalformedEnvelope`] if fewer than
    /// [`Envelope::MIN_LEN`] bytes are given.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_LEN {
            return Err(PhantomError::MalformedEnvelope);
        }

        let (salt, rest) = data.split_at(SALT_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);

        Ok(Self {
            salt: salt.try_into().map_err(|_| PhantomError::MalformedEnvelope)?,
            iv: iv.try_into().map_err(|_| PhantomError::MalformedEnvelope)?,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt plaintext under a password with a fresh salt and IV.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Envelope> {
    let salt = aead::generate_salt()?;
    let iv = aead::generate_iv()?;

    let key = kdf::derive_key(password, &salt)?;
    let ciphertext = aead::encrypt(&key, &iv, plaintext)?;

    Ok(Envelope::new(salt, iv, ciphertext))
}

/// Decrypt an envelope with a password.
///
/// Any failure after the key is derived is reported as
/// [`PhantomError::Authentication`]; the cause is never distinguished.
pub fn decrypt(envelope: &Envelope, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let key = kdf::derive_key(password, envelope.salt())?;

    aead::decrypt(&key, envelope.iv(), envelope.ciphertext())
        .map_err(|_| PhantomError::Authentication)
}
