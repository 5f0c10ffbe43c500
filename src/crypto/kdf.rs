use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{ITERATIONS, KEY_LEN, SALT_LEN};
use crate::error::{PhantomError, Result};

/// Derive a 256-bit AES key from a password with PBKDF2-HMAC-SHA256.
///
/// The iteration count is fixed, so the same password and salt always give
/// the same key. The password is not validated; an empty one is accepted.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);

    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, ITERATIONS, &mut key[..])
        .map_err(|_| PhantomError::KeyDerivation)?;

    Ok(key)
}
